//! Envelope encryption configuration.

use serde::Deserialize;

/// Keys below this length trigger a startup warning.
pub const MIN_RECOMMENDED_KEY_LEN: usize = 32;

#[derive(Clone, Deserialize)]
pub struct SecurityConfig {
    /// Secret the AES-256-GCM envelope key is derived from.
    pub message_key: String,
    /// Store message content sealed instead of plaintext.
    #[serde(default)]
    pub encrypt_at_rest: bool,
}

impl SecurityConfig {
    pub fn is_weak_key(&self) -> bool {
        self.message_key.len() < MIN_RECOMMENDED_KEY_LEN
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("message_key", &"<redacted>")
            .field("encrypt_at_rest", &self.encrypt_at_rest)
            .finish()
    }
}
