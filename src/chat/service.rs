//! Chat orchestration shared by both protocols.
//!
//! Every operation validates input, persists, updates presence and only then
//! broadcasts. Content leaving this service, whether in broadcasts or join
//! history, is always sealed.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embed::{EmbedFetcher, first_url};
use super::moderation::{self, Action};
use super::types::{ChatMessage, Embed, MessageKind};
use super::validation::{
    validate_attachment, validate_channel_name, validate_content, validate_status_message,
};
use crate::broadcast::Broadcasters;
use crate::config::{AccountBlock, ChannelBlock, LimitsConfig};
use crate::crypto::{Envelope, strip_marker};
use crate::db::{ChannelRecord, Database, DbError, NewMessage, StoredMessage, UserRecord, UserStatus};
use crate::error::{ChatError, ChatResult};
use crate::state::PresenceTracker;

use super::Role;

/// Longest topic accepted, in characters.
pub const MAX_TOPIC_LEN: usize = 390;
/// Longest mute, in minutes.
pub const MAX_MUTE_MINUTES: u32 = 7 * 24 * 60;

/// The connection and account performing an operation.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: i64,
    pub username: &'a str,
    pub conn_id: &'a str,
}

/// A message submitted by a client.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub channel: String,
    /// Envelope or legacy plaintext.
    pub content: String,
    pub kind: MessageKind,
    pub attachment: Option<Embed>,
}

impl SendRequest {
    pub fn text(channel: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            content: content.into(),
            kind: MessageKind::Text,
            attachment: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub channel: ChannelRecord,
    /// False when the user was already present in the channel.
    pub newly_joined: bool,
    /// Recent messages, oldest first, sealed.
    pub history: Vec<ChatMessage>,
}

/// Tunables for [`ChatService`].
#[derive(Debug, Clone, Default)]
pub struct ChatSettings {
    pub limits: LimitsConfig,
    pub encrypt_at_rest: bool,
    /// Canonical name of the channel that cannot be deleted.
    pub default_channel: Option<String>,
}

pub struct ChatService {
    db: Database,
    envelope: Arc<Envelope>,
    presence: Arc<PresenceTracker>,
    broadcasters: Broadcasters,
    embeds: Arc<dyn EmbedFetcher>,
    settings: ChatSettings,
}

enum Eviction {
    Kick,
    Ban,
}

impl ChatService {
    pub fn new(
        db: Database,
        envelope: Arc<Envelope>,
        presence: Arc<PresenceTracker>,
        broadcasters: Broadcasters,
        embeds: Arc<dyn EmbedFetcher>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            db,
            envelope,
            presence,
            broadcasters,
            embeds,
            settings,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.settings.limits
    }

    pub fn default_channel(&self) -> Option<&str> {
        self.settings.default_channel.as_deref()
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Create configured accounts and channels that don't exist yet.
    pub async fn provision(
        &self,
        accounts: &[AccountBlock],
        channels: &[ChannelBlock],
    ) -> ChatResult<()> {
        for account in accounts {
            match self
                .db
                .users()
                .create(&account.username, &account.password, account.role)
                .await
            {
                Ok(user) => info!(user = %user.username, role = %user.role, "Account provisioned"),
                Err(DbError::UserExists(_)) => debug!(user = %account.username, "Account exists"),
                Err(e) => return Err(e.into()),
            }
        }

        for block in channels {
            let name = validate_channel_name(&block.name, self.settings.limits.max_channel_name)?;
            if self.db.channels().find_by_name(&name).await?.is_some() {
                continue;
            }
            match self
                .db
                .channels()
                .create(&name, block.topic.as_deref(), None)
                .await
            {
                Ok(_) | Err(DbError::ChannelExists(_)) => info!(channel = %name, "Channel provisioned"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Check credentials. Unknown users, wrong passwords and banned accounts
    /// all fail the same way.
    pub async fn authenticate(&self, username: &str, password: &str) -> ChatResult<UserRecord> {
        self.db
            .users()
            .verify(username, password)
            .await?
            .ok_or(ChatError::Auth)
    }

    /// Attach a live connection for `user_id`.
    pub async fn connect(&self, conn_id: &str, user_id: i64, username: &str) -> ChatResult<()> {
        if self.presence.add_connection(conn_id, user_id, username) {
            self.db
                .users()
                .set_status(user_id, UserStatus::Online, None)
                .await?;
            info!(user = %username, conn = %conn_id, "User online");
        }
        Ok(())
    }

    /// Detach a connection. When it was the user's last one, the user goes
    /// offline and the channels it occupied hear about it once.
    pub async fn disconnect(&self, conn_id: &str) {
        let Some(outcome) = self.presence.remove_connection(conn_id) else {
            return;
        };
        if !outcome.went_offline {
            return;
        }

        info!(user = %outcome.username, conn = %conn_id, "User offline");
        if let Err(e) = self
            .db
            .users()
            .set_status(outcome.user_id, UserStatus::Offline, None)
            .await
        {
            warn!(user = %outcome.username, error = %e, "Failed to persist offline status");
        }
        self.broadcasters
            .status_changed(&outcome.channels, &outcome.username, UserStatus::Offline, None)
            .await;
    }

    /// Drop every live connection, for server shutdown.
    pub async fn shutdown(&self, reason: &str) {
        let drained = self.presence.shutdown();
        info!(
            connections = drained.connection_ids.len(),
            users = drained.users.len(),
            "Disconnecting all clients"
        );
        for user in &drained.users {
            if let Err(e) = self
                .db
                .users()
                .set_status(user.user_id, UserStatus::Offline, None)
                .await
            {
                warn!(user = %user.username, error = %e, "Failed to persist offline status");
            }
        }
        self.broadcasters
            .force_disconnect(&drained.connection_ids, reason)
            .await;
    }

    /// Report a failure to a single connection on whichever protocol owns it.
    pub async fn notify_error(&self, conn_id: &str, message: &str) {
        self.broadcasters.error_to(conn_id, message).await;
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    pub async fn send_message(&self, actor: &Actor<'_>, req: SendRequest) -> ChatResult<ChatMessage> {
        let limits = &self.settings.limits;
        let name = validate_channel_name(&req.channel, limits.max_channel_name)?;
        let channel = self.require_channel(&name).await?;

        let plaintext = self
            .envelope
            .open(&req.content)
            .map_err(|_| ChatError::validation("Message could not be decrypted"))?;
        let plaintext = strip_marker(&plaintext);

        match req.kind {
            MessageKind::Text => validate_content(&plaintext, limits.max_message_length)?,
            kind => {
                match req.attachment.as_ref() {
                    Some(embed) if embed.kind() == Some(kind) => validate_attachment(embed, limits)?,
                    _ => {
                        return Err(ChatError::validation(format!(
                            "A {} message needs a matching attachment",
                            kind.as_str()
                        )));
                    }
                }
                if !plaintext.is_empty() {
                    validate_content(&plaintext, limits.max_message_length)?;
                }
            }
        }

        let user = self.require_user(actor.user_id).await?;
        if user.banned {
            return Err(ChatError::forbidden("You are banned"));
        }
        let now = chrono::Utc::now().timestamp_millis();
        if user.has_expired_mute(now) {
            self.db.users().set_muted_until(user.id, None).await?;
        } else if user.is_muted_at(now) {
            return Err(ChatError::forbidden("You are muted"));
        }

        let embed = match (req.kind, req.attachment) {
            (MessageKind::Text, _) => match first_url(&plaintext) {
                Some(url) => self.embeds.fetch(url).await,
                None => None,
            },
            (_, attachment) => attachment,
        };
        let embed_json = embed
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ChatError::Storage(DbError::Corrupt(e.to_string())))?;

        let sealed = self.envelope.seal(&plaintext)?;
        let stored_content = if self.settings.encrypt_at_rest {
            sealed.as_str()
        } else {
            plaintext.as_str()
        };

        let stored = self
            .db
            .messages()
            .append(NewMessage {
                channel_id: channel.id,
                user_id: Some(user.id),
                username: &user.username,
                content: stored_content,
                kind: req.kind.as_str(),
                embed: embed_json.as_deref(),
            })
            .await?;

        let outbound = ChatMessage {
            id: stored.id,
            channel: name,
            user_id: stored.user_id,
            username: stored.username,
            content: sealed,
            kind: req.kind,
            embed,
            created_at: stored.created_at,
        };

        self.broadcasters.message_sent(&outbound, actor.conn_id).await;
        crate::metrics::record_message_sent();
        debug!(channel = %outbound.channel, id = outbound.id, "Message sent");
        Ok(outbound)
    }

    // ========================================================================
    // Channels
    // ========================================================================

    pub async fn join_channel(&self, actor: &Actor<'_>, raw_name: &str) -> ChatResult<JoinOutcome> {
        let name = validate_channel_name(raw_name, self.settings.limits.max_channel_name)?;
        let (channel, created) = self
            .db
            .channels()
            .find_or_create(&name, Some(actor.user_id))
            .await?;
        if created {
            info!(channel = %name, by = %actor.username, "Channel created");
        }

        self.db.channels().add_member(channel.id, actor.user_id).await?;

        let newly_joined = self.presence.join_channel(actor.username, &name);
        if newly_joined {
            self.broadcasters
                .user_joined(&name, actor.username, Some(actor.conn_id))
                .await;
        }

        let history = self.history(&channel).await?;
        Ok(JoinOutcome {
            channel,
            newly_joined,
            history,
        })
    }

    /// Returns true when the user was present in the channel.
    pub async fn leave_channel(
        &self,
        actor: &Actor<'_>,
        raw_name: &str,
        reason: Option<&str>,
    ) -> ChatResult<bool> {
        let name = validate_channel_name(raw_name, self.settings.limits.max_channel_name)?;
        let channel = self.require_channel(&name).await?;

        self.db
            .channels()
            .remove_member(channel.id, actor.user_id)
            .await?;

        let left = self.presence.leave_channel(actor.username, &name);
        if left {
            self.broadcasters.user_left(&name, actor.username, reason).await;
        }
        Ok(left)
    }

    /// Recent messages of a channel, oldest first, sealed.
    pub async fn history(&self, channel: &ChannelRecord) -> ChatResult<Vec<ChatMessage>> {
        let stored = self
            .db
            .messages()
            .recent(channel.id, self.settings.limits.history_window)
            .await?;
        stored
            .into_iter()
            .map(|msg| self.to_outbound(msg, &channel.name))
            .collect()
    }

    /// Look up an existing channel by any spelling of its name.
    pub async fn channel(&self, raw_name: &str) -> ChatResult<ChannelRecord> {
        let name = validate_channel_name(raw_name, self.settings.limits.max_channel_name)?;
        self.require_channel(&name).await
    }

    pub async fn list_channels(&self) -> ChatResult<Vec<ChannelRecord>> {
        Ok(self.db.channels().list().await?)
    }

    /// Online members of a channel.
    pub fn members(&self, channel: &str) -> Vec<String> {
        self.presence.members_of(channel)
    }

    /// Persisted channel memberships of an account.
    pub async fn memberships(&self, user_id: i64) -> ChatResult<Vec<String>> {
        Ok(self.db.channels().memberships(user_id).await?)
    }

    pub async fn set_topic(
        &self,
        actor: &Actor<'_>,
        raw_name: &str,
        topic: Option<&str>,
    ) -> ChatResult<ChannelRecord> {
        let mut channel = self.channel(raw_name).await?;
        let user = self.require_user(actor.user_id).await?;
        if channel.created_by != Some(user.id) {
            moderation::authorize(user.role, Action::SetTopic)?;
        }

        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        if topic.is_some_and(|t| t.chars().count() > MAX_TOPIC_LEN) {
            return Err(ChatError::validation(format!(
                "Topic too long (max {} characters)",
                MAX_TOPIC_LEN
            )));
        }

        self.db.channels().set_topic(channel.id, topic).await?;
        channel.topic = topic.map(str::to_string);
        self.broadcasters.channel_updated(&channel).await;
        Ok(channel)
    }

    /// Delete a channel, its history and memberships. The default channel is
    /// protected.
    pub async fn delete_channel(&self, actor: &Actor<'_>, raw_name: &str) -> ChatResult<()> {
        let channel = self.channel(raw_name).await?;
        if self.default_channel() == Some(channel.name.as_str()) {
            return Err(ChatError::Protected(channel.name));
        }
        let user = self.require_user(actor.user_id).await?;
        if channel.created_by != Some(user.id) {
            moderation::authorize(user.role, Action::DeleteChannel)?;
        }

        for member in self.presence.remove_channel(&channel.name) {
            self.broadcasters
                .user_left(&channel.name, &member, Some("Channel deleted"))
                .await;
        }
        self.db.channels().delete(channel.id).await?;
        info!(channel = %channel.name, by = %user.username, "Channel deleted");
        Ok(())
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub async fn update_status(
        &self,
        actor: &Actor<'_>,
        status: UserStatus,
        message: Option<&str>,
    ) -> ChatResult<()> {
        let message = message.map(str::trim).filter(|m| !m.is_empty());
        if let Some(message) = message {
            validate_status_message(message, self.settings.limits.max_status_length)?;
        }

        self.db
            .users()
            .set_status(actor.user_id, status, message)
            .await?;

        let channels = self.presence.channels_of(actor.username);
        self.broadcasters
            .status_changed(&channels, actor.username, status, message)
            .await;
        Ok(())
    }

    pub async fn user(&self, username: &str) -> ChatResult<Option<UserRecord>> {
        Ok(self.db.users().find_by_name(username).await?)
    }

    // ========================================================================
    // Moderation
    // ========================================================================

    /// Disconnect an online user from every connection.
    pub async fn kick(&self, actor: &Actor<'_>, target: &str, reason: Option<&str>) -> ChatResult<()> {
        let (moderator, target) = self.moderation_pair(actor, target, Action::Kick).await?;
        let reason = reason.unwrap_or("Kicked by a moderator");
        if !self.presence.is_online(&target.username) {
            return Err(ChatError::NotFound(format!("Online user '{}'", target.username)));
        }
        self.evict(&moderator, &target, reason, Eviction::Kick).await;
        info!(target = %target.username, by = %moderator.username, "User kicked");
        Ok(())
    }

    /// Ban an account and disconnect it if online.
    pub async fn ban(&self, actor: &Actor<'_>, target: &str, reason: Option<&str>) -> ChatResult<()> {
        let (moderator, target) = self.moderation_pair(actor, target, Action::Ban).await?;
        let reason = reason.unwrap_or("Banned by an administrator");
        self.db.users().set_banned(target.id, true).await?;
        self.evict(&moderator, &target, reason, Eviction::Ban).await;
        info!(target = %target.username, by = %moderator.username, "User banned");
        Ok(())
    }

    /// Mute for `minutes`. Returns when the mute ends (unix millis).
    pub async fn mute(&self, actor: &Actor<'_>, target: &str, minutes: u32) -> ChatResult<i64> {
        if minutes == 0 || minutes > MAX_MUTE_MINUTES {
            return Err(ChatError::validation(format!(
                "Mute duration must be between 1 and {} minutes",
                MAX_MUTE_MINUTES
            )));
        }
        let (moderator, target) = self.moderation_pair(actor, target, Action::Mute).await?;
        let until = chrono::Utc::now().timestamp_millis() + i64::from(minutes) * 60_000;
        self.db.users().set_muted_until(target.id, Some(until)).await?;
        info!(target = %target.username, by = %moderator.username, minutes, "User muted");
        Ok(until)
    }

    pub async fn unmute(&self, actor: &Actor<'_>, target: &str) -> ChatResult<()> {
        let (moderator, target) = self.moderation_pair(actor, target, Action::Mute).await?;
        self.db.users().set_muted_until(target.id, None).await?;
        info!(target = %target.username, by = %moderator.username, "User unmuted");
        Ok(())
    }

    /// Authors may delete their own messages; anyone else needs a moderator.
    pub async fn delete_message(&self, actor: &Actor<'_>, message_id: i64) -> ChatResult<()> {
        let message = self
            .db
            .messages()
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Message {}", message_id)))?;
        let user = self.require_user(actor.user_id).await?;
        if message.user_id != Some(user.id) {
            moderation::authorize(user.role, Action::DeleteMessage)?;
        }

        let channel = self
            .db
            .channels()
            .find_by_id(message.channel_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Channel {}", message.channel_id)))?;

        self.db.messages().delete(message_id).await?;
        self.broadcasters
            .message_deleted(&channel.name, message_id)
            .await;
        Ok(())
    }

    /// Remove a channel's entire history.
    pub async fn clear_channel(&self, actor: &Actor<'_>, raw_name: &str) -> ChatResult<u64> {
        let user = self.require_user(actor.user_id).await?;
        moderation::authorize(user.role, Action::ClearChannel)?;
        let channel = self.channel(raw_name).await?;

        let removed = self.db.messages().clear_channel(channel.id).await?;
        self.broadcasters
            .channel_cleared(&channel.name, &user.username)
            .await;
        info!(channel = %channel.name, removed, by = %user.username, "Channel cleared");
        Ok(removed)
    }

    pub async fn assign_role(&self, actor: &Actor<'_>, target: &str, role: Role) -> ChatResult<()> {
        let user = self.require_user(actor.user_id).await?;
        let target = self.require_user_named(target).await?;
        moderation::authorize_role_change(user.role, target.role, role)?;
        self.db.users().set_role(target.id, role).await?;
        info!(target = %target.username, role = %role, by = %user.username, "Role assigned");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn require_channel(&self, name: &str) -> ChatResult<ChannelRecord> {
        self.db
            .channels()
            .find_by_name(name)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Channel '{}'", name)))
    }

    async fn require_user(&self, id: i64) -> ChatResult<UserRecord> {
        self.db
            .users()
            .find_by_id(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("User {}", id)))
    }

    async fn require_user_named(&self, username: &str) -> ChatResult<UserRecord> {
        self.db
            .users()
            .find_by_name(username)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("User '{}'", username)))
    }

    async fn moderation_pair(
        &self,
        actor: &Actor<'_>,
        target: &str,
        action: Action,
    ) -> ChatResult<(UserRecord, UserRecord)> {
        let moderator = self.require_user(actor.user_id).await?;
        moderation::authorize(moderator.role, action)?;
        let target = self.require_user_named(target).await?;
        moderation::authorize_against(moderator.role, target.role, action)?;
        Ok((moderator, target))
    }

    /// Remove every connection of `target` at once, tell its channels, then
    /// close the sockets.
    async fn evict(&self, moderator: &UserRecord, target: &UserRecord, reason: &str, kind: Eviction) {
        let Some(removal) = self.presence.force_remove_user(&target.username) else {
            return;
        };

        if let Err(e) = self
            .db
            .users()
            .set_status(target.id, UserStatus::Offline, None)
            .await
        {
            warn!(user = %target.username, error = %e, "Failed to persist offline status");
        }

        match kind {
            Eviction::Kick => {
                self.broadcasters
                    .user_kicked(&removal.channels, &removal.username, &moderator.username, reason)
                    .await
            }
            Eviction::Ban => {
                self.broadcasters
                    .user_banned(&removal.channels, &removal.username, &moderator.username, reason)
                    .await
            }
        }
        self.broadcasters
            .force_disconnect(&removal.connection_ids, reason)
            .await;
    }

    fn to_outbound(&self, stored: StoredMessage, channel: &str) -> ChatResult<ChatMessage> {
        let content = if Envelope::is_sealed(&stored.content) {
            stored.content.clone()
        } else {
            self.envelope.seal(&stored.content)?
        };
        Ok(ChatMessage::from_stored(stored, channel, content))
    }
}
