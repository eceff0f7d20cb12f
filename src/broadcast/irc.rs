//! IRC adapter: renders chat events as IRC lines.
//!
//! Recipients are chosen by each connection's own channel set, so a user
//! joined to a channel only on the hub sees nothing here. The sender's own IRC
//! connections never receive an echo of their messages.

use async_trait::async_trait;
use echohub_proto::{Message, irc_channel};
use std::sync::Arc;
use tracing::debug;

use super::{BroadcastResult, Broadcaster};
use crate::chat::ChatMessage;
use crate::crypto::Envelope;
use crate::db::{ChannelRecord, UserStatus};
use crate::format::IrcFormatter;
use crate::state::{IrcConnection, IrcRegistry, is_irc_connection};

pub struct IrcBroadcaster {
    registry: Arc<IrcRegistry>,
    envelope: Arc<Envelope>,
    formatter: IrcFormatter,
    server_name: String,
}

impl IrcBroadcaster {
    pub fn new(
        registry: Arc<IrcRegistry>,
        envelope: Arc<Envelope>,
        formatter: IrcFormatter,
        server_name: &str,
    ) -> Self {
        Self {
            registry,
            envelope,
            formatter,
            server_name: server_name.to_string(),
        }
    }

    /// Deliver to each recipient, logging per-connection failures. A dead
    /// socket is cleaned up by its own task.
    fn deliver(recipients: &[Arc<IrcConnection>], lines: &[Message]) -> usize {
        let mut delivered = 0;
        for conn in recipients {
            let result = lines.iter().try_for_each(|line| conn.send(line.clone()));
            match result {
                Ok(()) => delivered += 1,
                Err(e) => debug!(conn = %conn.id(), error = %e, "Dropped line for peer"),
            }
        }
        delivered
    }

    fn notice(&self, target: &str, text: &str) -> Message {
        Message::new("NOTICE", [target, text])
            .with_prefix(self.server_name.clone())
            .with_trailing()
    }

    /// Send `KICK` lines for `username` in each channel and drop those
    /// channels from the user's IRC connections.
    fn remove_from_channels(&self, channels: &[String], username: &str, by: &str, reason: &str) {
        let prefix = self.formatter.user_prefix(by);
        let targets = self.registry.of_user(username);
        for channel in channels {
            let line = Message::new("KICK", [irc_channel(channel), username.to_string(), reason.to_string()])
                .with_prefix(prefix.clone())
                .with_trailing();
            Self::deliver(&self.registry.in_channel(channel), &[line]);
            for conn in &targets {
                conn.part_channel(channel);
            }
        }
    }
}

#[async_trait]
impl Broadcaster for IrcBroadcaster {
    fn name(&self) -> &'static str {
        "irc"
    }

    async fn message_sent(&self, message: &ChatMessage, _sender_conn: &str) -> BroadcastResult {
        let recipients: Vec<Arc<IrcConnection>> = self
            .registry
            .in_channel(&message.channel)
            .into_iter()
            .filter(|conn| {
                !conn
                    .account()
                    .is_some_and(|account| account.eq_ignore_ascii_case(&message.username))
            })
            .collect();
        if recipients.is_empty() {
            return Ok(());
        }

        let plaintext = self.envelope.open_or_placeholder(&message.content);
        let lines = self.formatter.render(message, &plaintext);
        let delivered = Self::deliver(&recipients, &lines);
        crate::metrics::record_fanout(delivered);
        Ok(())
    }

    async fn user_joined(
        &self,
        channel: &str,
        username: &str,
        exclude_conn: Option<&str>,
    ) -> BroadcastResult {
        let line = Message::new("JOIN", [irc_channel(channel)])
            .with_prefix(self.formatter.user_prefix(username));
        let recipients: Vec<Arc<IrcConnection>> = self
            .registry
            .in_channel(channel)
            .into_iter()
            .filter(|conn| Some(conn.id()) != exclude_conn)
            .collect();
        Self::deliver(&recipients, &[line]);
        Ok(())
    }

    async fn user_left(&self, channel: &str, username: &str, reason: Option<&str>) -> BroadcastResult {
        let mut params = vec![irc_channel(channel)];
        params.extend(reason.map(str::to_string));
        let mut line = Message::new("PART", params).with_prefix(self.formatter.user_prefix(username));
        if reason.is_some() {
            line = line.with_trailing();
        }

        Self::deliver(&self.registry.in_channel(channel), &[line]);
        for conn in self.registry.of_user(username) {
            conn.part_channel(channel);
        }
        Ok(())
    }

    async fn channel_updated(&self, channel: &ChannelRecord) -> BroadcastResult {
        let line = Message::new(
            "TOPIC",
            [irc_channel(&channel.name), channel.topic.clone().unwrap_or_default()],
        )
        .with_prefix(self.server_name.clone())
        .with_trailing();
        Self::deliver(&self.registry.in_channel(&channel.name), &[line]);
        Ok(())
    }

    async fn status_changed(
        &self,
        _channels: &[String],
        _username: &str,
        _status: UserStatus,
        _message: Option<&str>,
    ) -> BroadcastResult {
        // IRC clients learn about away status through WHO and WHOIS.
        Ok(())
    }

    async fn user_kicked(
        &self,
        channels: &[String],
        username: &str,
        by: &str,
        reason: &str,
    ) -> BroadcastResult {
        self.remove_from_channels(channels, username, by, reason);
        Ok(())
    }

    async fn user_banned(
        &self,
        channels: &[String],
        username: &str,
        by: &str,
        reason: &str,
    ) -> BroadcastResult {
        self.remove_from_channels(channels, username, by, &format!("Banned: {}", reason));
        Ok(())
    }

    async fn message_deleted(&self, channel: &str, message_id: i64) -> BroadcastResult {
        let line = self.notice(
            &irc_channel(channel),
            &format!("Message {} was deleted by a moderator", message_id),
        );
        Self::deliver(&self.registry.in_channel(channel), &[line]);
        Ok(())
    }

    async fn channel_cleared(&self, channel: &str, by: &str) -> BroadcastResult {
        let line = self.notice(
            &irc_channel(channel),
            &format!("Channel history was cleared by {}", by),
        );
        Self::deliver(&self.registry.in_channel(channel), &[line]);
        Ok(())
    }

    async fn error_to(&self, conn_id: &str, message: &str) -> BroadcastResult {
        if !is_irc_connection(conn_id) {
            return Ok(());
        }
        let Some(conn) = self.registry.get(conn_id) else {
            return Ok(());
        };
        conn.send(self.notice(&conn.nick_or_star(), message))
    }

    async fn force_disconnect(&self, conn_ids: &[String], reason: &str) -> BroadcastResult {
        for id in conn_ids.iter().filter(|id| is_irc_connection(id)) {
            let Some(conn) = self.registry.get(id) else {
                continue;
            };
            let line = Message::new(
                "ERROR",
                [format!("Closing Link: {} ({})", conn.nick_or_star(), reason)],
            )
            .with_trailing();
            if let Err(e) = conn.send(line) {
                debug!(conn = %id, error = %e, "Could not send closing notice");
            }
            conn.close();
        }
        Ok(())
    }
}
