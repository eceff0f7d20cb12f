//! Hub connection registry with named groups.
//!
//! Every hub socket registers a queue here. Groups are channel names; a
//! connection belongs to a group once it has joined that channel. Frames
//! are serialized once per fan-out and shared between recipients.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::protocol::HubEvent;
use crate::error::BroadcastError;

/// What a hub socket task is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Arc<str>),
    Close(String),
}

/// Delivery surface the hub broadcaster talks to.
pub trait HubTransport: Send + Sync {
    fn send_to(&self, conn_id: &str, event: &HubEvent) -> Result<(), BroadcastError>;

    /// Returns the number of connections reached.
    fn send_to_group(
        &self,
        group: &str,
        event: &HubEvent,
        except: Option<&str>,
    ) -> Result<usize, BroadcastError>;

    fn send_to_many(&self, conn_ids: &[String], event: &HubEvent) -> Result<usize, BroadcastError>;

    fn add_to_group(&self, conn_id: &str, group: &str);

    fn remove_from_group(&self, conn_id: &str, group: &str);

    fn group_members(&self, group: &str) -> Vec<String>;

    fn connections_of_user(&self, username: &str) -> Vec<String>;

    /// Tell the client why, then close its socket.
    fn disconnect(&self, conn_id: &str, reason: &str);
}

struct Peer {
    username: String,
    tx: mpsc::UnboundedSender<Outbound>,
    groups: HashSet<String>,
}

#[derive(Default)]
pub struct HubConnections {
    peers: DashMap<String, Peer>,
    groups: DashMap<String, HashSet<String>>,
}

fn encode(event: &HubEvent) -> Result<Arc<str>, BroadcastError> {
    Ok(Arc::from(serde_json::to_string(event)?))
}

impl HubConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket and return the queue its task drains.
    pub fn register(&self, conn_id: &str, username: &str) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.insert(
            conn_id.to_string(),
            Peer {
                username: username.to_string(),
                tx,
                groups: HashSet::new(),
            },
        );
        rx
    }

    /// Forget a socket and its group memberships.
    pub fn unregister(&self, conn_id: &str) {
        let Some((_, peer)) = self.peers.remove(conn_id) else {
            return;
        };
        for group in peer.groups {
            self.leave_group_index(conn_id, &group);
        }
    }

    pub fn contains(&self, conn_id: &str) -> bool {
        self.peers.contains_key(conn_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn leave_group_index(&self, conn_id: &str, group: &str) {
        let now_empty = match self.groups.get_mut(group) {
            Some(mut members) => {
                members.remove(conn_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.groups.remove_if(group, |_, members| members.is_empty());
        }
    }

    fn push(&self, conn_id: &str, outbound: Outbound) -> bool {
        self.peers
            .get(conn_id)
            .is_some_and(|peer| peer.tx.send(outbound).is_ok())
    }
}

impl HubTransport for HubConnections {
    fn send_to(&self, conn_id: &str, event: &HubEvent) -> Result<(), BroadcastError> {
        if self.push(conn_id, Outbound::Frame(encode(event)?)) {
            Ok(())
        } else {
            Err(BroadcastError::PeerGone(conn_id.to_string()))
        }
    }

    fn send_to_group(
        &self,
        group: &str,
        event: &HubEvent,
        except: Option<&str>,
    ) -> Result<usize, BroadcastError> {
        let members: Vec<String> = self
            .group_members(group)
            .into_iter()
            .filter(|id| Some(id.as_str()) != except)
            .collect();
        self.send_to_many(&members, event)
    }

    fn send_to_many(&self, conn_ids: &[String], event: &HubEvent) -> Result<usize, BroadcastError> {
        if conn_ids.is_empty() {
            return Ok(0);
        }
        let frame = encode(event)?;
        Ok(conn_ids
            .iter()
            .filter(|id| self.push(id, Outbound::Frame(Arc::clone(&frame))))
            .count())
    }

    fn add_to_group(&self, conn_id: &str, group: &str) {
        let Some(mut peer) = self.peers.get_mut(conn_id) else {
            return;
        };
        peer.groups.insert(group.to_string());
        drop(peer);
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    fn remove_from_group(&self, conn_id: &str, group: &str) {
        if let Some(mut peer) = self.peers.get_mut(conn_id) {
            peer.groups.remove(group);
        }
        self.leave_group_index(conn_id, group);
    }

    fn group_members(&self, group: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    fn connections_of_user(&self, username: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .peers
            .iter()
            .filter(|peer| peer.username.eq_ignore_ascii_case(username))
            .map(|peer| peer.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn disconnect(&self, conn_id: &str, reason: &str) {
        let event = HubEvent::Disconnected {
            reason: reason.to_string(),
        };
        if let Ok(frame) = encode(&event) {
            self.push(conn_id, Outbound::Frame(frame));
        }
        self.push(conn_id, Outbound::Close(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn group_fan_out_honors_exclusion() {
        let hub = HubConnections::new();
        let mut a = hub.register("hub-a", "alice");
        let mut b = hub.register("hub-b", "bob");
        hub.add_to_group("hub-a", "general");
        hub.add_to_group("hub-b", "general");

        let reached = hub
            .send_to_group("general", &HubEvent::Pong, Some("hub-a"))
            .unwrap();
        assert_eq!(reached, 1);
        assert!(frames(&mut a).is_empty());
        assert_eq!(frames(&mut b), vec![Outbound::Frame(Arc::from(r#"{"type":"pong"}"#))]);
    }

    #[test]
    fn unregister_cleans_groups() {
        let hub = HubConnections::new();
        let _a = hub.register("hub-a", "alice");
        hub.add_to_group("hub-a", "general");
        hub.unregister("hub-a");
        assert!(hub.group_members("general").is_empty());
        assert!(!hub.contains("hub-a"));
        assert!(hub.send_to("hub-a", &HubEvent::Pong).is_err());
    }

    #[test]
    fn unknown_connection_cannot_join_groups() {
        let hub = HubConnections::new();
        hub.add_to_group("hub-ghost", "general");
        assert!(hub.group_members("general").is_empty());
    }

    #[test]
    fn remove_from_group() {
        let hub = HubConnections::new();
        let _a = hub.register("hub-a", "alice");
        hub.add_to_group("hub-a", "general");
        hub.add_to_group("hub-a", "random");
        hub.remove_from_group("hub-a", "general");
        assert!(hub.group_members("general").is_empty());
        assert_eq!(hub.group_members("random"), vec!["hub-a"]);
    }

    #[test]
    fn connections_by_user() {
        let hub = HubConnections::new();
        let _a = hub.register("hub-a", "alice");
        let _b = hub.register("hub-b", "Alice");
        let _c = hub.register("hub-c", "carol");
        assert_eq!(hub.connections_of_user("ALICE"), vec!["hub-a", "hub-b"]);
    }

    #[test]
    fn disconnect_sends_reason_then_close() {
        let hub = HubConnections::new();
        let mut a = hub.register("hub-a", "alice");
        hub.disconnect("hub-a", "Banned");
        let out = frames(&mut a);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Outbound::Frame(f) if f.contains("disconnected")));
        assert_eq!(out[1], Outbound::Close("Banned".into()));
    }
}
