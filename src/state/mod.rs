//! State management module.
//!
//! Contains the presence tracker shared by both protocols and the registry
//! of live IRC connections.

pub mod connection;
pub mod presence;

pub use connection::{Identity, IrcConnection, IrcRegistry};
pub use presence::{Disconnect, ForcedRemoval, OnlineUser, PresenceTracker};

/// Connection id prefix for IRC sockets.
pub const IRC_PREFIX: &str = "irc-";
/// Connection id prefix for hub sockets.
pub const HUB_PREFIX: &str = "hub-";

/// Allocate a fresh IRC connection id.
pub fn irc_connection_id() -> String {
    format!("{}{}", IRC_PREFIX, uuid::Uuid::new_v4())
}

/// Allocate a fresh hub connection id.
pub fn hub_connection_id() -> String {
    format!("{}{}", HUB_PREFIX, uuid::Uuid::new_v4())
}

pub fn is_irc_connection(id: &str) -> bool {
    id.starts_with(IRC_PREFIX)
}

pub fn is_hub_connection(id: &str) -> bool {
    id.starts_with(HUB_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_protocol_prefix() {
        let irc = irc_connection_id();
        let hub = hub_connection_id();
        assert!(is_irc_connection(&irc) && !is_hub_connection(&irc));
        assert!(is_hub_connection(&hub) && !is_irc_connection(&hub));
        assert_ne!(irc_connection_id(), irc);
    }
}
