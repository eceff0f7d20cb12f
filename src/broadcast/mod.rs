//! Fan-out of chat events to every protocol.
//!
//! Each protocol implements [`Broadcaster`]. [`Broadcasters`] calls every
//! adapter in turn and isolates them from each other: an error or a panic in
//! one adapter is logged and counted, and the remaining adapters still run.

pub mod hub;
pub mod irc;

use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

use crate::chat::ChatMessage;
use crate::db::{ChannelRecord, UserStatus};
use crate::error::BroadcastError;

pub use hub::HubBroadcaster;
pub use irc::IrcBroadcaster;

pub type BroadcastResult = Result<(), BroadcastError>;

/// Delivery of chat events to one protocol's connections.
///
/// Message content handed to adapters is always in sealed outbound form.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Adapter name for logs and metrics.
    fn name(&self) -> &'static str;

    async fn message_sent(&self, message: &ChatMessage, sender_conn: &str) -> BroadcastResult;

    /// `exclude_conn` is the connection that performed the join.
    async fn user_joined(
        &self,
        channel: &str,
        username: &str,
        exclude_conn: Option<&str>,
    ) -> BroadcastResult;

    async fn user_left(&self, channel: &str, username: &str, reason: Option<&str>)
    -> BroadcastResult;

    async fn channel_updated(&self, channel: &ChannelRecord) -> BroadcastResult;

    /// One call covers every channel the user is in.
    async fn status_changed(
        &self,
        channels: &[String],
        username: &str,
        status: UserStatus,
        message: Option<&str>,
    ) -> BroadcastResult;

    async fn user_kicked(
        &self,
        channels: &[String],
        username: &str,
        by: &str,
        reason: &str,
    ) -> BroadcastResult;

    async fn user_banned(
        &self,
        channels: &[String],
        username: &str,
        by: &str,
        reason: &str,
    ) -> BroadcastResult;

    async fn message_deleted(&self, channel: &str, message_id: i64) -> BroadcastResult;

    async fn channel_cleared(&self, channel: &str, by: &str) -> BroadcastResult;

    /// Report an error to one connection. Adapters ignore ids they don't own.
    async fn error_to(&self, conn_id: &str, message: &str) -> BroadcastResult;

    /// Close the given connections. Adapters ignore ids they don't own.
    async fn force_disconnect(&self, conn_ids: &[String], reason: &str) -> BroadcastResult;
}

/// Every registered adapter, called in registration order.
#[derive(Clone, Default)]
pub struct Broadcasters {
    adapters: Arc<Vec<Arc<dyn Broadcaster>>>,
}

macro_rules! fan_out {
    ($self:ident, $event:literal, |$b:ident| $call:expr) => {{
        for $b in $self.adapters.iter() {
            let outcome = AssertUnwindSafe($call).catch_unwind().await;
            report($b.name(), $event, outcome);
        }
    }};
}

fn report(adapter: &'static str, event: &'static str, outcome: Result<BroadcastResult, Box<dyn Any + Send>>) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(adapter, event, error = %e, "Broadcast failed");
            crate::metrics::record_broadcast_failure(adapter);
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(adapter, event, panic = %detail, "Broadcaster panicked");
            crate::metrics::record_broadcast_failure(adapter);
        }
    }
}

impl Broadcasters {
    pub fn new(adapters: Vec<Arc<dyn Broadcaster>>) -> Self {
        Self {
            adapters: Arc::new(adapters),
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub async fn message_sent(&self, message: &ChatMessage, sender_conn: &str) {
        fan_out!(self, "message_sent", |b| b.message_sent(message, sender_conn));
    }

    pub async fn user_joined(&self, channel: &str, username: &str, exclude_conn: Option<&str>) {
        fan_out!(self, "user_joined", |b| b.user_joined(channel, username, exclude_conn));
    }

    pub async fn user_left(&self, channel: &str, username: &str, reason: Option<&str>) {
        fan_out!(self, "user_left", |b| b.user_left(channel, username, reason));
    }

    pub async fn channel_updated(&self, channel: &ChannelRecord) {
        fan_out!(self, "channel_updated", |b| b.channel_updated(channel));
    }

    pub async fn status_changed(
        &self,
        channels: &[String],
        username: &str,
        status: UserStatus,
        message: Option<&str>,
    ) {
        fan_out!(self, "status_changed", |b| b.status_changed(
            channels, username, status, message
        ));
    }

    pub async fn user_kicked(&self, channels: &[String], username: &str, by: &str, reason: &str) {
        fan_out!(self, "user_kicked", |b| b.user_kicked(channels, username, by, reason));
    }

    pub async fn user_banned(&self, channels: &[String], username: &str, by: &str, reason: &str) {
        fan_out!(self, "user_banned", |b| b.user_banned(channels, username, by, reason));
    }

    pub async fn message_deleted(&self, channel: &str, message_id: i64) {
        fan_out!(self, "message_deleted", |b| b.message_deleted(channel, message_id));
    }

    pub async fn channel_cleared(&self, channel: &str, by: &str) {
        fan_out!(self, "channel_cleared", |b| b.channel_cleared(channel, by));
    }

    pub async fn error_to(&self, conn_id: &str, message: &str) {
        fan_out!(self, "error_to", |b| b.error_to(conn_id, message));
    }

    pub async fn force_disconnect(&self, conn_ids: &[String], reason: &str) {
        fan_out!(self, "force_disconnect", |b| b.force_disconnect(conn_ids, reason));
    }
}
