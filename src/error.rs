//! Unified error handling for echohub.
//!
//! Business operations return [`ChatError`] values; IRC command handlers
//! return [`HandlerError`], which knows how to render itself as a numeric.
//! Broadcaster failures are [`BroadcastError`] and never escape the fan-out.

use echohub_proto::{Message, Response};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::db::DbError;

// ============================================================================
// Chat Errors (orchestration)
// ============================================================================

/// Outcome taxonomy of chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad name, oversized field, empty content. Always user-facing.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// Attempt to delete the default channel.
    #[error("channel '{0}' is protected")]
    Protected(String),

    #[error("authentication failed")]
    Auth,

    #[error("storage failure: {0}")]
    Storage(#[from] DbError),

    #[error("envelope failure: {0}")]
    Crypto(#[from] CryptoError),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Static label for metrics and logs.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Protected(_) => "protected",
            Self::Auth => "auth",
            Self::Storage(_) => "storage",
            Self::Crypto(_) => "crypto",
        }
    }

    /// Text safe to show to the requesting client.
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Crypto(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ============================================================================
// Broadcast Errors (per-adapter delivery)
// ============================================================================

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer {0} is gone")]
    PeerGone(String),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Handler Errors (IRC command processing)
// ============================================================================

/// Errors that can occur during IRC command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("no nickname given")]
    NoNicknameGiven,

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("send error: {0}")]
    Send(#[from] std::io::Error),

    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Static label for metrics and logs.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::NoNicknameGiven => "no_nickname_given",
            Self::ErroneousNickname(_) => "erroneous_nickname",
            Self::NicknameInUse(_) => "nickname_in_use",
            Self::UnknownCommand(_) => "unknown_command",
            Self::Send(_) => "send_error",
            Self::Quit(_) => "quit",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Convert to an IRC error reply.
    ///
    /// Returns `None` for errors that don't warrant a client-visible reply.
    pub fn to_irc_reply(&self, server_name: &str, nick: &str, cmd_name: &str) -> Option<Message> {
        let nick = nick.to_string();
        let (response, params) = match self {
            Self::NeedMoreParams => (
                Response::ERR_NEEDMOREPARAMS,
                vec![nick, cmd_name.to_string(), "Not enough parameters".to_string()],
            ),
            Self::NotRegistered => (
                Response::ERR_NOTREGISTERED,
                vec![nick, "You have not registered".to_string()],
            ),
            Self::AlreadyRegistered => (
                Response::ERR_ALREADYREGISTRED,
                vec![nick, "You may not reregister".to_string()],
            ),
            Self::NoNicknameGiven => (
                Response::ERR_NONICKNAMEGIVEN,
                vec![nick, "No nickname given".to_string()],
            ),
            Self::ErroneousNickname(bad) => (
                Response::ERR_ERRONEUSNICKNAME,
                vec![nick, bad.clone(), "Erroneous nickname".to_string()],
            ),
            Self::NicknameInUse(bad) => (
                Response::ERR_NICKNAMEINUSE,
                vec![nick, bad.clone(), "Nickname is already in use".to_string()],
            ),
            Self::UnknownCommand(cmd) => (
                Response::ERR_UNKNOWNCOMMAND,
                vec![nick, cmd.clone(), "Unknown command".to_string()],
            ),
            Self::Send(_) | Self::Quit(_) | Self::Internal(_) => return None,
        };

        Some(Message::response(server_name, response, params))
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_codes() {
        assert_eq!(HandlerError::NeedMoreParams.error_code(), "need_more_params");
        assert_eq!(HandlerError::NotRegistered.error_code(), "not_registered");
        assert_eq!(HandlerError::Internal("x".into()).error_code(), "internal_error");
    }

    #[test]
    fn handler_error_to_irc_reply() {
        let reply = HandlerError::NeedMoreParams
            .to_irc_reply("irc.test", "alice", "JOIN")
            .unwrap();
        assert_eq!(reply.to_string(), ":irc.test 461 alice JOIN :Not enough parameters");

        let reply = HandlerError::NotRegistered.to_irc_reply("irc.test", "*", "LIST").unwrap();
        assert_eq!(reply.command, "451");

        assert!(HandlerError::Quit(None).to_irc_reply("irc.test", "a", "QUIT").is_none());
        assert!(HandlerError::Internal("oops".into()).to_irc_reply("s", "n", "X").is_none());
    }

    #[test]
    fn chat_error_hides_storage_details() {
        let err = ChatError::Storage(DbError::Corrupt("row 7".into()));
        assert_eq!(err.user_message(), "Internal server error");
        assert_eq!(ChatError::validation("Message too long").user_message(), "Message too long");
        assert_eq!(err.error_code(), "storage");
    }
}
