//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::bootstrap::{AccountBlock, ChannelBlock};
use super::embeds::EmbedsConfig;
use super::limits::LimitsConfig;
use super::listen::{ListenConfig, WebSocketConfig};
use super::security::SecurityConfig;
use super::validation::{self, ValidationError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// IRC listener.
    pub listen: ListenConfig,
    /// Optional hub (WebSocket) listener.
    pub websocket: Option<WebSocketConfig>,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Envelope key and at-rest policy.
    pub security: SecurityConfig,
    /// Content and output limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Link preview fetching.
    #[serde(default)]
    pub embeds: EmbedsConfig,
    /// Message of the Day configuration.
    #[serde(default)]
    pub motd: MotdConfig,
    /// Accounts created at startup when missing.
    #[serde(default)]
    pub accounts: Vec<AccountBlock>,
    /// Channels created at startup when missing. The first is the default channel.
    #[serde(default)]
    pub channels: Vec<ChannelBlock>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// SQLite path, `echohub.db` when unset.
    pub fn database_path(&self) -> &str {
        self.database
            .as_ref()
            .map(|d| d.path.as_str())
            .unwrap_or("echohub.db")
    }

    /// Canonical name of the protected default channel, if any is configured.
    pub fn default_channel(&self) -> Option<String> {
        self.channels
            .first()
            .map(|c| echohub_proto::canonical_channel(&c.name))
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, used as the prefix of numeric replies.
    pub name: String,
    /// Network name, advertised in 005.
    pub network: String,
    /// Server description.
    #[serde(default = "default_description")]
    pub description: String,
    /// Host part of every user hostmask.
    #[serde(default = "default_host_tag")]
    pub host_tag: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

fn default_description() -> String {
    "echohub chat server".to_string()
}

fn default_host_tag() -> String {
    "echohub".to_string()
}

pub(super) fn default_true() -> bool {
    true
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    pub path: String,
}

/// Message of the Day (MOTD) configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MotdConfig {
    /// Path to MOTD file (one line per MOTD line).
    pub file: Option<String>,
    /// Inline MOTD lines (used when `file` is not set or unreadable).
    #[serde(default)]
    pub lines: Vec<String>,
}

impl MotdConfig {
    /// Load MOTD lines. `None` means no MOTD is configured.
    pub fn load_lines(&self) -> Option<Vec<String>> {
        if let Some(ref path) = self.file {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    return Some(content.lines().map(|s| s.to_string()).collect());
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to read MOTD file");
                }
            }
        }

        if self.lines.is_empty() {
            None
        } else {
            Some(self.lines.clone())
        }
    }
}
