//! Input validation shared by every protocol path.

use super::types::Embed;
use crate::config::LimitsConfig;
use crate::error::{ChatError, ChatResult};

/// Canonicalize and validate a channel name.
///
/// The canonical form has no prefix, is lowercase, and uses only
/// `[a-z0-9_-]`.
pub fn validate_channel_name(raw: &str, max_len: usize) -> ChatResult<String> {
    let name = echohub_proto::canonical_channel(raw);

    if name.is_empty() {
        return Err(ChatError::validation("Channel name cannot be empty"));
    }
    if name.chars().count() > max_len {
        return Err(ChatError::validation(format!(
            "Channel name too long (max {} characters)",
            max_len
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ChatError::validation(
            "Channel name may only contain letters, digits, '-' and '_'",
        ));
    }

    Ok(name)
}

/// Reject empty or over-length message content. Length is in characters.
pub fn validate_content(content: &str, max_chars: usize) -> ChatResult<()> {
    if content.trim().is_empty() {
        return Err(ChatError::validation("Message cannot be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(ChatError::validation(format!(
            "Message too long (max {} characters)",
            max_chars
        )));
    }
    Ok(())
}

pub fn validate_status_message(message: &str, max_chars: usize) -> ChatResult<()> {
    if message.chars().count() > max_chars {
        return Err(ChatError::validation(format!(
            "Status message too long (max {} characters)",
            max_chars
        )));
    }
    Ok(())
}

/// Bound image art so one attachment stays a handful of lines on the wire.
pub fn validate_attachment(embed: &Embed, limits: &LimitsConfig) -> ChatResult<()> {
    let Embed::Image { art, .. } = embed else {
        return Ok(());
    };
    if art.len() > limits.max_art_rows {
        return Err(ChatError::validation(format!(
            "Image has too many rows (max {})",
            limits.max_art_rows
        )));
    }
    if art.iter().any(|row| row.len() > limits.max_art_row_bytes) {
        return Err(ChatError::validation(format!(
            "Image row too long (max {} bytes)",
            limits.max_art_row_bytes
        )));
    }
    Ok(())
}

/// Maximum nickname length on the IRC surface.
pub const MAX_NICK_LEN: usize = 32;

/// Nicknames follow usernames: a letter first, then letters, digits, `-` or `_`.
pub fn is_valid_nickname(nick: &str) -> bool {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    nick.len() <= MAX_NICK_LEN
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
