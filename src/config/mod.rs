//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, MotdConfig)
//! - [`listen`]: Listener configuration (ListenConfig, WebSocketConfig)
//! - [`security`]: Envelope key and at-rest policy (SecurityConfig)
//! - [`limits`]: Content and output limits (LimitsConfig)
//! - [`embeds`]: Link preview fetching (EmbedsConfig)
//! - [`bootstrap`]: Accounts and channels provisioned at startup
//! - [`validation`]: Post-load sanity checks

mod bootstrap;
mod embeds;
mod limits;
mod listen;
mod security;
mod types;
mod validation;

pub use bootstrap::{AccountBlock, ChannelBlock};
pub use embeds::EmbedsConfig;
pub use limits::LimitsConfig;
pub use listen::{ListenConfig, WebSocketConfig};
pub use security::SecurityConfig;
pub use types::{Config, ConfigError, DatabaseConfig, MotdConfig, ServerConfig};
pub use validation::ValidationError;
