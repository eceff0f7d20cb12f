//! Link preview fetching configuration.

use serde::Deserialize;

use super::types::default_true;

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whole-request timeout in milliseconds (default: 3000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Response body cap in bytes (default: 512 KiB).
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for EmbedsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_max_bytes() -> usize {
    512 * 1024
}
