//! Hub adapter: pushes JSON events to WebSocket clients.
//!
//! Channel groups in the transport mirror membership. Message content is
//! forwarded in its sealed form; hub clients open envelopes themselves.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{BroadcastResult, Broadcaster};
use crate::chat::ChatMessage;
use crate::db::{ChannelRecord, UserStatus};
use crate::hub::{HubEvent, HubTransport};
use crate::state::is_hub_connection;

pub struct HubBroadcaster {
    transport: Arc<dyn HubTransport>,
}

impl HubBroadcaster {
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        Self { transport }
    }

    /// Distinct connections across `channels`, plus any extra ids.
    fn audience(&self, channels: &[String], extra: Vec<String>) -> Vec<String> {
        let mut ids: BTreeSet<String> = extra.into_iter().collect();
        for channel in channels {
            ids.extend(self.transport.group_members(channel));
        }
        ids.into_iter().collect()
    }

    fn evict(&self, channels: &[String], username: &str, event: HubEvent) -> BroadcastResult {
        let own = self.transport.connections_of_user(username);
        let audience = self.audience(channels, own.clone());
        self.transport.send_to_many(&audience, &event)?;
        for conn in &own {
            for channel in channels {
                self.transport.remove_from_group(conn, channel);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for HubBroadcaster {
    fn name(&self) -> &'static str {
        "hub"
    }

    async fn message_sent(&self, message: &ChatMessage, sender_conn: &str) -> BroadcastResult {
        let except = is_hub_connection(sender_conn).then_some(sender_conn);
        let event = HubEvent::MessageSent {
            message: message.clone(),
        };
        self.transport
            .send_to_group(&message.channel, &event, except)?;
        Ok(())
    }

    async fn user_joined(
        &self,
        channel: &str,
        username: &str,
        exclude_conn: Option<&str>,
    ) -> BroadcastResult {
        let event = HubEvent::UserJoined {
            channel: channel.to_string(),
            username: username.to_string(),
        };
        self.transport.send_to_group(channel, &event, exclude_conn)?;
        Ok(())
    }

    async fn user_left(&self, channel: &str, username: &str, reason: Option<&str>) -> BroadcastResult {
        let event = HubEvent::UserLeft {
            channel: channel.to_string(),
            username: username.to_string(),
            reason: reason.map(str::to_string),
        };
        self.transport.send_to_group(channel, &event, None)?;
        for conn in self.transport.connections_of_user(username) {
            self.transport.remove_from_group(&conn, channel);
        }
        Ok(())
    }

    async fn channel_updated(&self, channel: &ChannelRecord) -> BroadcastResult {
        let event = HubEvent::ChannelUpdated {
            channel: channel.into(),
        };
        self.transport.send_to_group(&channel.name, &event, None)?;
        Ok(())
    }

    async fn status_changed(
        &self,
        channels: &[String],
        username: &str,
        status: UserStatus,
        message: Option<&str>,
    ) -> BroadcastResult {
        let audience = self.audience(channels, Vec::new());
        let event = HubEvent::StatusChanged {
            username: username.to_string(),
            status,
            message: message.map(str::to_string),
        };
        self.transport.send_to_many(&audience, &event)?;
        Ok(())
    }

    async fn user_kicked(
        &self,
        channels: &[String],
        username: &str,
        by: &str,
        reason: &str,
    ) -> BroadcastResult {
        self.evict(
            channels,
            username,
            HubEvent::Kicked {
                username: username.to_string(),
                by: by.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    async fn user_banned(
        &self,
        channels: &[String],
        username: &str,
        by: &str,
        reason: &str,
    ) -> BroadcastResult {
        self.evict(
            channels,
            username,
            HubEvent::Banned {
                username: username.to_string(),
                by: by.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    async fn message_deleted(&self, channel: &str, message_id: i64) -> BroadcastResult {
        let event = HubEvent::MessageDeleted {
            channel: channel.to_string(),
            message_id,
        };
        self.transport.send_to_group(channel, &event, None)?;
        Ok(())
    }

    async fn channel_cleared(&self, channel: &str, by: &str) -> BroadcastResult {
        let event = HubEvent::ChannelCleared {
            channel: channel.to_string(),
            by: by.to_string(),
        };
        self.transport.send_to_group(channel, &event, None)?;
        Ok(())
    }

    async fn error_to(&self, conn_id: &str, message: &str) -> BroadcastResult {
        if !is_hub_connection(conn_id) {
            return Ok(());
        }
        self.transport.send_to(
            conn_id,
            &HubEvent::Error {
                message: message.to_string(),
            },
        )
    }

    async fn force_disconnect(&self, conn_ids: &[String], reason: &str) -> BroadcastResult {
        for id in conn_ids.iter().filter(|id| is_hub_connection(id)) {
            self.transport.disconnect(id, reason);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageKind;
    use crate::hub::{HubConnections, Outbound};
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> (Arc<HubConnections>, HubBroadcaster) {
        let hub = Arc::new(HubConnections::new());
        let broadcaster = HubBroadcaster::new(hub.clone());
        (hub, broadcaster)
    }

    fn events(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Frame(frame) = item {
                out.push(serde_json::from_str(&frame).unwrap());
            }
        }
        out
    }

    fn message(channel: &str) -> ChatMessage {
        ChatMessage {
            id: 3,
            channel: channel.into(),
            user_id: Some(1),
            username: "alice".into(),
            content: "ENC:abc:def".into(),
            kind: MessageKind::Text,
            embed: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn message_excludes_only_hub_sender() {
        let (hub, b) = setup();
        let mut a1 = hub.register("hub-a1", "alice");
        let mut a2 = hub.register("hub-a2", "alice");
        hub.add_to_group("hub-a1", "general");
        hub.add_to_group("hub-a2", "general");

        b.message_sent(&message("general"), "hub-a1").await.unwrap();
        assert!(events(&mut a1).is_empty());
        let got = events(&mut a2);
        assert_eq!(got[0]["type"], "messageSent");
        assert_eq!(got[0]["message"]["content"], "ENC:abc:def");
    }

    #[tokio::test]
    async fn irc_originated_message_reaches_every_hub_member() {
        let (hub, b) = setup();
        let mut a1 = hub.register("hub-a1", "alice");
        hub.add_to_group("hub-a1", "general");

        b.message_sent(&message("general"), "irc-xyz").await.unwrap();
        assert_eq!(events(&mut a1).len(), 1);
    }

    #[tokio::test]
    async fn status_reaches_each_connection_once() {
        let (hub, b) = setup();
        let mut c = hub.register("hub-c", "carol");
        hub.add_to_group("hub-c", "general");
        hub.add_to_group("hub-c", "random");

        b.status_changed(
            &["general".to_string(), "random".to_string()],
            "alice",
            UserStatus::Offline,
            None,
        )
        .await
        .unwrap();

        let got = events(&mut c);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["status"], "offline");
    }

    #[tokio::test]
    async fn leave_removes_users_connections_from_group() {
        let (hub, b) = setup();
        let mut a = hub.register("hub-a", "alice");
        let mut c = hub.register("hub-c", "carol");
        hub.add_to_group("hub-a", "general");
        hub.add_to_group("hub-c", "general");

        b.user_left("general", "alice", None).await.unwrap();
        assert_eq!(events(&mut a)[0]["type"], "userLeft");
        assert_eq!(events(&mut c)[0]["username"], "alice");
        assert_eq!(hub.group_members("general"), vec!["hub-c"]);
    }

    #[tokio::test]
    async fn kick_notifies_channels_and_target() {
        let (hub, b) = setup();
        let mut target = hub.register("hub-t", "troll");
        let mut watcher = hub.register("hub-w", "watcher");
        hub.add_to_group("hub-w", "general");
        hub.add_to_group("hub-t", "general");

        b.user_kicked(&["general".to_string()], "troll", "mod", "spam")
            .await
            .unwrap();
        b.force_disconnect(&["hub-t".to_string(), "irc-1".to_string()], "Kicked")
            .await
            .unwrap();

        assert_eq!(events(&mut watcher)[0]["type"], "kicked");
        let got = events(&mut target);
        assert_eq!(got[0]["type"], "kicked");
        assert_eq!(got[1]["type"], "disconnected");
        assert_eq!(hub.group_members("general"), vec!["hub-w"]);
    }

    #[tokio::test]
    async fn error_to_ignores_irc_ids() {
        let (hub, b) = setup();
        let mut a = hub.register("hub-a", "alice");
        b.error_to("irc-a", "nope").await.unwrap();
        assert!(events(&mut a).is_empty());
        b.error_to("hub-a", "nope").await.unwrap();
        assert_eq!(events(&mut a)[0]["message"], "nope");
    }
}
