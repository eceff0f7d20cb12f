//! Error types for the echohub protocol crate.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Transport-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while parsing a single protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The line was empty (or only whitespace) after CRLF trimming.
    #[error("empty message")]
    EmptyMessage,

    /// A prefix was present but no command followed it.
    #[error("missing command after prefix")]
    MissingCommand,

    /// The command token contained characters outside `[A-Za-z0-9]`.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Errors produced while decoding a SASL PLAIN payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslError {
    /// Payload was not valid base64.
    #[error("invalid base64")]
    InvalidBase64,

    /// Payload did not contain exactly three NUL-separated fields.
    #[error("invalid SASL PLAIN format")]
    InvalidFormat,

    /// A field was not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,

    /// The authentication identity was empty.
    #[error("empty authcid")]
    EmptyAuthcid,
}
