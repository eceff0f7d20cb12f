//! Presence tracking across both protocols.
//!
//! Maps connections to users and users to channel membership. A user is
//! online while at least one connection is attached; the last disconnect
//! takes the user offline and out of every channel.
//!
//! # Thread Safety
//!
//! All indexes sit behind one `parking_lot::RwLock` so compound updates
//! (remove connection, capture channels, drop memberships) are atomic.
//! Every query returns an owned copy.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// A user as seen through one of its connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineUser {
    pub user_id: i64,
    pub username: String,
}

/// Result of removing a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub user_id: i64,
    pub username: String,
    /// True when this was the user's last connection.
    pub went_offline: bool,
    /// Channels the user occupied before removal, sorted.
    pub channels: Vec<String>,
}

/// Result of forcibly removing a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedRemoval {
    pub user_id: i64,
    pub username: String,
    pub connection_ids: Vec<String>,
    pub channels: Vec<String>,
}

/// Everything that was attached when presence was cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drained {
    /// Sorted.
    pub connection_ids: Vec<String>,
    /// Sorted by username.
    pub users: Vec<OnlineUser>,
}

#[derive(Debug)]
struct UserEntry {
    user_id: i64,
    username: String,
    connections: HashSet<String>,
    channels: HashSet<String>,
}

#[derive(Debug, Default)]
struct Index {
    /// Connection id -> user key.
    connections: HashMap<String, String>,
    /// Lowercased username -> entry.
    users: HashMap<String, UserEntry>,
    /// Channel -> member user keys.
    channels: HashMap<String, HashSet<String>>,
}

impl Index {
    fn drop_user(&mut self, key: &str) -> Option<UserEntry> {
        let entry = self.users.remove(key)?;
        for conn in &entry.connections {
            self.connections.remove(conn);
        }
        for channel in &entry.channels {
            if let Some(members) = self.channels.get_mut(channel) {
                members.remove(key);
                if members.is_empty() {
                    self.channels.remove(channel);
                }
            }
        }
        Some(entry)
    }
}

fn user_key(username: &str) -> String {
    username.to_ascii_lowercase()
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut items: Vec<String> = set.iter().cloned().collect();
    items.sort();
    items
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    index: RwLock<Index>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection. Returns true when this is the user's first
    /// connection, i.e. the user just came online.
    pub fn add_connection(&self, conn_id: &str, user_id: i64, username: &str) -> bool {
        let mut index = self.index.write();
        if index.connections.contains_key(conn_id) {
            return false;
        }

        let key = user_key(username);
        index.connections.insert(conn_id.to_string(), key.clone());
        let entry = index.users.entry(key).or_insert_with(|| UserEntry {
            user_id,
            username: username.to_string(),
            connections: HashSet::new(),
            channels: HashSet::new(),
        });
        entry.connections.insert(conn_id.to_string());
        entry.connections.len() == 1
    }

    /// Detach a connection. `None` if it was never attached (or was already
    /// force-removed).
    pub fn remove_connection(&self, conn_id: &str) -> Option<Disconnect> {
        let mut index = self.index.write();
        let key = index.connections.remove(conn_id)?;

        let entry = index.users.get_mut(&key)?;
        entry.connections.remove(conn_id);
        let channels = sorted(&entry.channels);
        let user_id = entry.user_id;
        let username = entry.username.clone();
        let went_offline = entry.connections.is_empty();

        if went_offline {
            index.drop_user(&key);
        }

        Some(Disconnect {
            user_id,
            username,
            went_offline,
            channels,
        })
    }

    /// Record channel membership. False if the user is offline or already
    /// a member.
    pub fn join_channel(&self, username: &str, channel: &str) -> bool {
        let mut index = self.index.write();
        let key = user_key(username);
        let Some(entry) = index.users.get_mut(&key) else {
            return false;
        };
        if !entry.channels.insert(channel.to_string()) {
            return false;
        }
        index
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(key);
        true
    }

    /// Drop channel membership. False if the user was not a member.
    pub fn leave_channel(&self, username: &str, channel: &str) -> bool {
        let mut index = self.index.write();
        let key = user_key(username);
        let Some(entry) = index.users.get_mut(&key) else {
            return false;
        };
        if !entry.channels.remove(channel) {
            return false;
        }
        if let Some(members) = index.channels.get_mut(channel) {
            members.remove(&key);
            if members.is_empty() {
                index.channels.remove(channel);
            }
        }
        true
    }

    pub fn channels_of(&self, username: &str) -> Vec<String> {
        self.index
            .read()
            .users
            .get(&user_key(username))
            .map(|entry| sorted(&entry.channels))
            .unwrap_or_default()
    }

    pub fn connections_of(&self, username: &str) -> Vec<String> {
        self.index
            .read()
            .users
            .get(&user_key(username))
            .map(|entry| sorted(&entry.connections))
            .unwrap_or_default()
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.index.read().users.contains_key(&user_key(username))
    }

    pub fn in_channel(&self, username: &str, channel: &str) -> bool {
        self.index
            .read()
            .users
            .get(&user_key(username))
            .is_some_and(|entry| entry.channels.contains(channel))
    }

    /// Display names of the channel's online members, sorted.
    pub fn members_of(&self, channel: &str) -> Vec<String> {
        let index = self.index.read();
        let Some(keys) = index.channels.get(channel) else {
            return Vec::new();
        };
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| index.users.get(key).map(|e| e.username.clone()))
            .collect();
        names.sort_by_key(|name| name.to_ascii_lowercase());
        names
    }

    pub fn user_for(&self, conn_id: &str) -> Option<OnlineUser> {
        let index = self.index.read();
        let key = index.connections.get(conn_id)?;
        index.users.get(key).map(|entry| OnlineUser {
            user_id: entry.user_id,
            username: entry.username.clone(),
        })
    }

    /// Remove a user and all of its connections at once, returning exactly
    /// what the caller needs to notify channels and close sockets.
    pub fn force_remove_user(&self, username: &str) -> Option<ForcedRemoval> {
        let mut index = self.index.write();
        let entry = index.drop_user(&user_key(username))?;
        Some(ForcedRemoval {
            user_id: entry.user_id,
            username: entry.username,
            connection_ids: sorted(&entry.connections),
            channels: sorted(&entry.channels),
        })
    }

    /// Forget a channel entirely. Returns the display names of the members
    /// that were in it.
    pub fn remove_channel(&self, channel: &str) -> Vec<String> {
        let mut index = self.index.write();
        let Some(keys) = index.channels.remove(channel) else {
            return Vec::new();
        };
        let mut names = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = index.users.get_mut(&key) {
                entry.channels.remove(channel);
                names.push(entry.username.clone());
            }
        }
        names.sort();
        names
    }

    pub fn online_count(&self) -> usize {
        self.index.read().users.len()
    }

    /// Clear everything. Returns the connections and users that were attached.
    pub fn shutdown(&self) -> Drained {
        let index = std::mem::take(&mut *self.index.write());
        let mut connection_ids: Vec<String> = index.connections.into_keys().collect();
        connection_ids.sort();
        let mut users: Vec<OnlineUser> = index
            .users
            .into_values()
            .map(|entry| OnlineUser {
                user_id: entry.user_id,
                username: entry.username,
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Drained {
            connection_ids,
            users,
        }
    }
}
