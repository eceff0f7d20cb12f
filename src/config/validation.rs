//! Configuration validation.
//!
//! Validates configuration at load time to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.network is required")]
    MissingNetworkName,
    #[error("server.host_tag must be non-empty and contain no spaces, got '{0}'")]
    InvalidHostTag(String),
    #[error("security.message_key is required")]
    MissingMessageKey,
    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("account '{0}' has an empty username or password")]
    InvalidAccount(String),
    #[error("channel '{0}' has an invalid name")]
    InvalidChannel(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if config.server.network.trim().is_empty() {
        errors.push(ValidationError::MissingNetworkName);
    }

    let tag = &config.server.host_tag;
    if tag.is_empty() || tag.contains(char::is_whitespace) {
        errors.push(ValidationError::InvalidHostTag(tag.clone()));
    }

    if config.security.message_key.is_empty() {
        errors.push(ValidationError::MissingMessageKey);
    }

    let limits = &config.limits;
    for (name, value) in [
        ("max_message_length", limits.max_message_length),
        ("history_window", limits.history_window),
        ("max_status_length", limits.max_status_length),
        ("split_bytes", limits.split_bytes),
        ("preview_description_chars", limits.preview_description_chars),
        ("max_channel_name", limits.max_channel_name),
        ("max_art_rows", limits.max_art_rows),
        ("max_art_row_bytes", limits.max_art_row_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit(name));
        }
    }

    if let Some(ref db) = config.database {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    for account in &config.accounts {
        if account.username.trim().is_empty() || account.password.is_empty() {
            errors.push(ValidationError::InvalidAccount(account.username.clone()));
        }
    }

    for channel in &config.channels {
        if crate::chat::validation::validate_channel_name(&channel.name, limits.max_channel_name)
            .is_err()
        {
            errors.push(ValidationError::InvalidChannel(channel.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
