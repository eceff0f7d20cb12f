//! Chat message shapes shared by both protocols.

use serde::{Deserialize, Serialize};

use crate::db::StoredMessage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Audio,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "file" => Self::File,
            "audio" => Self::Audio,
            _ => Self::Text,
        }
    }
}

/// Metadata rendered alongside message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Embed {
    #[serde(rename_all = "camelCase")]
    Link {
        url: String,
        title: Option<String>,
        description: Option<String>,
        site_name: Option<String>,
    },
    /// An image with its ASCII art rendition, one row per entry.
    Image {
        name: String,
        url: String,
        #[serde(default)]
        art: Vec<String>,
    },
    File {
        name: String,
        url: String,
        size: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        name: String,
        url: String,
        duration_secs: Option<u32>,
    },
}

impl Embed {
    /// The message kind this attachment belongs to, `None` for link previews.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Self::Link { .. } => None,
            Self::Image { .. } => Some(MessageKind::Image),
            Self::File { .. } => Some(MessageKind::File),
            Self::Audio { .. } => Some(MessageKind::Audio),
        }
    }
}

/// A chat message as handed to broadcasters and clients.
///
/// Outside of the IRC formatter `content` is always the sealed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    /// Canonical channel name.
    pub channel: String,
    pub user_id: Option<i64>,
    pub username: String,
    pub content: String,
    pub kind: MessageKind,
    pub embed: Option<Embed>,
    /// Unix millis.
    pub created_at: i64,
}

impl ChatMessage {
    /// Rebuild from a stored row, replacing its content.
    pub fn from_stored(stored: StoredMessage, channel: &str, content: String) -> Self {
        let embed = stored.embed.as_deref().and_then(|json| {
            serde_json::from_str(json)
                .inspect_err(|e| {
                    tracing::warn!(message_id = stored.id, error = %e, "Dropping unreadable embed");
                })
                .ok()
        });

        Self {
            id: stored.id,
            channel: channel.to_string(),
            user_id: stored.user_id,
            username: stored.username,
            content,
            kind: MessageKind::parse(&stored.kind),
            embed,
            created_at: stored.created_at,
        }
    }
}
