//! Accounts and channels provisioned at startup.

use serde::Deserialize;

use crate::chat::Role;

/// An account created at startup if it does not exist yet.
#[derive(Clone, Deserialize)]
pub struct AccountBlock {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

impl std::fmt::Debug for AccountBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountBlock")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// A channel created at startup if it does not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelBlock {
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
}
