//! Live IRC connections.
//!
//! Each socket task owns the reading side; everyone else talks to the client
//! through its [`IrcConnection`] handle, which queues outgoing messages for
//! the socket task to write.

use dashmap::DashMap;
use echohub_proto::Message;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::BroadcastError;

/// Queued messages a client may fall behind by before it is dropped.
pub const MAX_SENDQ: usize = 4096;

/// Who is on the other end of the socket.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub nick: Option<String>,
    pub ident: Option<String>,
    pub realname: Option<String>,
    pub user_id: Option<i64>,
    /// Account username once authenticated.
    pub account: Option<String>,
    pub away: Option<String>,
    pub registered: bool,
}

pub struct IrcConnection {
    id: String,
    addr: SocketAddr,
    sender: mpsc::UnboundedSender<Message>,
    queued: AtomicUsize,
    identity: RwLock<Identity>,
    /// Canonical names of channels joined on this connection.
    channels: RwLock<HashSet<String>>,
    cancel: CancellationToken,
    /// Unix seconds.
    signon: i64,
    last_active: Mutex<Instant>,
}

impl IrcConnection {
    /// Create a handle and the queue its socket task drains.
    pub fn new(
        id: String,
        addr: SocketAddr,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id,
            addr,
            sender,
            queued: AtomicUsize::new(0),
            identity: RwLock::new(Identity::default()),
            channels: RwLock::new(HashSet::new()),
            cancel,
            signon: chrono::Utc::now().timestamp(),
            last_active: Mutex::new(Instant::now()),
        });
        (conn, receiver)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a message for this client.
    ///
    /// A client whose queue has grown past [`MAX_SENDQ`] is cancelled.
    pub fn send(&self, msg: Message) -> Result<(), BroadcastError> {
        if self.queued.load(Ordering::Relaxed) >= MAX_SENDQ {
            warn!(conn = %self.id, "SendQ exceeded, dropping client");
            self.cancel.cancel();
            return Err(BroadcastError::PeerGone(self.id.clone()));
        }
        self.queued.fetch_add(1, Ordering::Relaxed);
        self.sender.send(msg).map_err(|_| {
            self.mark_written();
            BroadcastError::PeerGone(self.id.clone())
        })
    }

    /// Called by the socket task after writing one queued message.
    pub fn mark_written(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub fn update_identity(&self, f: impl FnOnce(&mut Identity)) {
        f(&mut self.identity.write());
    }

    pub fn is_registered(&self) -> bool {
        self.identity.read().registered
    }

    /// Nick for use in numerics, `*` before one is chosen.
    pub fn nick_or_star(&self) -> String {
        self.identity
            .read()
            .nick
            .clone()
            .unwrap_or_else(|| "*".to_string())
    }

    /// Account username, if authenticated.
    pub fn account(&self) -> Option<String> {
        self.identity.read().account.clone()
    }

    pub fn hostmask(&self, host_tag: &str) -> String {
        let identity = self.identity.read();
        let nick = identity.nick.as_deref().unwrap_or("*");
        let ident = identity.ident.as_deref().unwrap_or(nick);
        format!("{}!{}@{}", nick, ident, host_tag)
    }

    /// Returns false if already joined.
    pub fn join_channel(&self, channel: &str) -> bool {
        self.channels.write().insert(channel.to_string())
    }

    /// Returns false if not joined.
    pub fn part_channel(&self, channel: &str) -> bool {
        self.channels.write().remove(channel)
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.read().contains(channel)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.channels.read().iter().cloned().collect();
        channels.sort();
        channels
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ask the socket task to close.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn signon(&self) -> i64 {
        self.signon
    }

    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    pub fn idle_secs(&self) -> u64 {
        self.last_active.lock().elapsed().as_secs()
    }
}

/// Registry of live IRC connections by id.
#[derive(Default)]
pub struct IrcRegistry {
    connections: DashMap<String, Arc<IrcConnection>>,
}

impl IrcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<IrcConnection>) {
        self.connections.insert(conn.id().to_string(), conn);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<IrcConnection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: &str) -> Option<Arc<IrcConnection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of registered connections.
    pub fn registered(&self) -> Vec<Arc<IrcConnection>> {
        self.connections
            .iter()
            .filter(|entry| entry.is_registered())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Registered connections on `channel`.
    pub fn in_channel(&self, channel: &str) -> Vec<Arc<IrcConnection>> {
        self.connections
            .iter()
            .filter(|entry| entry.is_registered() && entry.in_channel(channel))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Registered connections authenticated as `username`.
    pub fn of_user(&self, username: &str) -> Vec<Arc<IrcConnection>> {
        self.connections
            .iter()
            .filter(|entry| {
                entry.is_registered()
                    && entry
                        .account()
                        .is_some_and(|account| account.eq_ignore_ascii_case(username))
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Whether `nick` is held by a connection of an account other than
    /// `account`.
    pub fn nick_held_by_other(&self, nick: &str, account: Option<&str>) -> bool {
        self.connections.iter().any(|entry| {
            let identity = entry.identity();
            identity.registered
                && identity
                    .nick
                    .as_deref()
                    .is_some_and(|held| held.eq_ignore_ascii_case(nick))
                && match (identity.account.as_deref(), account) {
                    (Some(holder), Some(asking)) => !holder.eq_ignore_ascii_case(asking),
                    _ => true,
                }
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
