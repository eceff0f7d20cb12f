//! Wire-level building blocks for the echohub IRC surface.
//!
//! This crate knows nothing about channels, users or storage. It parses and
//! serializes protocol lines, splits long text into wire-sized chunks,
//! transcodes color markup, decodes SASL PLAIN payloads and provides a
//! tolerant line codec for tokio.

#![deny(clippy::all)]

pub mod casemap;
pub mod colors;
pub mod error;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod response;
pub mod sasl;
pub mod split;

pub use casemap::{canonical_channel, irc_channel, is_channel_target, nick_eq};
pub use colors::{is_blank_row, markup_to_irc, strip_markup};
pub use error::{MessageParseError, ProtocolError, SaslError};
#[cfg(feature = "tokio")]
pub use line::LineCodec;
pub use message::Message;
pub use response::Response;
pub use sasl::{decode_plain, SaslPlain, SASL_CHUNK_SIZE};
pub use split::{split_message, DEFAULT_SPLIT_BYTES};
