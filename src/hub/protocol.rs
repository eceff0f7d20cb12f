//! JSON frames exchanged with hub clients.
//!
//! Every frame is an object tagged by `type`. The first client frame must be
//! `authenticate`; after that any [`HubRequest`] may be sent.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, Embed, MessageKind, Role};
use crate::db::{ChannelRecord, UserRecord, UserStatus, Visibility};

/// Client-to-server frames.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HubRequest {
    Authenticate {
        username: String,
        password: String,
    },
    JoinChannel {
        channel: String,
    },
    LeaveChannel {
        channel: String,
        #[serde(default)]
        reason: Option<String>,
    },
    /// `content` is an envelope or plaintext.
    SendMessage {
        channel: String,
        content: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default)]
        attachment: Option<Embed>,
    },
    UpdateStatus {
        status: UserStatus,
        #[serde(default)]
        message: Option<String>,
    },
    SetTopic {
        channel: String,
        #[serde(default)]
        topic: Option<String>,
    },
    Kick {
        username: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Ban {
        username: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Mute {
        username: String,
        minutes: u32,
    },
    Unmute {
        username: String,
    },
    DeleteMessage {
        message_id: i64,
    },
    ClearChannel {
        channel: String,
    },
    DeleteChannel {
        channel: String,
    },
    AssignRole {
        username: String,
        role: Role,
    },
    Ping,
}

impl HubRequest {
    /// Frame type, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::JoinChannel { .. } => "joinChannel",
            Self::LeaveChannel { .. } => "leaveChannel",
            Self::SendMessage { .. } => "sendMessage",
            Self::UpdateStatus { .. } => "updateStatus",
            Self::SetTopic { .. } => "setTopic",
            Self::Kick { .. } => "kick",
            Self::Ban { .. } => "ban",
            Self::Mute { .. } => "mute",
            Self::Unmute { .. } => "unmute",
            Self::DeleteMessage { .. } => "deleteMessage",
            Self::ClearChannel { .. } => "clearChannel",
            Self::DeleteChannel { .. } => "deleteChannel",
            Self::AssignRole { .. } => "assignRole",
            Self::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
}

impl From<&UserRecord> for UserInfo {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            status: user.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub name: String,
    pub topic: Option<String>,
    pub visibility: Visibility,
}

impl From<&ChannelRecord> for ChannelInfo {
    fn from(channel: &ChannelRecord) -> Self {
        Self {
            name: channel.name.clone(),
            topic: channel.topic.clone(),
            visibility: channel.visibility,
        }
    }
}

/// Server-to-client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HubEvent {
    Ready {
        connection_id: String,
        user: UserInfo,
        /// Channels the account belongs to.
        channels: Vec<String>,
    },
    Joined {
        channel: ChannelInfo,
        members: Vec<String>,
        history: Vec<ChatMessage>,
    },
    Left {
        channel: String,
    },
    MessageSent {
        message: ChatMessage,
    },
    UserJoined {
        channel: String,
        username: String,
    },
    UserLeft {
        channel: String,
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ChannelUpdated {
        channel: ChannelInfo,
    },
    StatusChanged {
        username: String,
        status: UserStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Kicked {
        username: String,
        by: String,
        reason: String,
    },
    Banned {
        username: String,
        by: String,
        reason: String,
    },
    MessageDeleted {
        channel: String,
        message_id: i64,
    },
    ChannelCleared {
        channel: String,
        by: String,
    },
    /// Acknowledges a request that has no richer reply.
    Ok {
        request: String,
    },
    Error {
        message: String,
    },
    Disconnected {
        reason: String,
    },
    Pong,
}
