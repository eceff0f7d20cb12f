//! Content and output limits configuration.

use serde::Deserialize;

/// Content and output limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message length in characters (default: 2000).
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Messages replayed on join (default: 50).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Maximum status message length in characters (default: 128).
    #[serde(default = "default_max_status_length")]
    pub max_status_length: usize,
    /// IRC chunk size in UTF-8 bytes (default: 400).
    #[serde(default = "default_split_bytes")]
    pub split_bytes: usize,
    /// Link preview description budget in characters (default: 200).
    #[serde(default = "default_preview_description_chars")]
    pub preview_description_chars: usize,
    /// Maximum canonical channel name length (default: 32).
    #[serde(default = "default_max_channel_name")]
    pub max_channel_name: usize,
    /// Most art rows an image attachment may carry.
    #[serde(default = "default_max_art_rows")]
    pub max_art_rows: usize,
    /// Longest art row, in bytes of markup.
    #[serde(default = "default_max_art_row_bytes")]
    pub max_art_row_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            history_window: default_history_window(),
            max_status_length: default_max_status_length(),
            split_bytes: default_split_bytes(),
            preview_description_chars: default_preview_description_chars(),
            max_channel_name: default_max_channel_name(),
            max_art_rows: default_max_art_rows(),
            max_art_row_bytes: default_max_art_row_bytes(),
        }
    }
}

fn default_max_message_length() -> usize {
    2000
}

fn default_history_window() -> usize {
    50
}

fn default_max_status_length() -> usize {
    128
}

fn default_split_bytes() -> usize {
    echohub_proto::DEFAULT_SPLIT_BYTES
}

fn default_preview_description_chars() -> usize {
    200
}

fn default_max_channel_name() -> usize {
    32
}

fn default_max_art_rows() -> usize {
    48
}

fn default_max_art_row_bytes() -> usize {
    2048
}
