//! Protocol-independent chat logic.
//!
//! [`ChatService`] owns every state transition. The IRC and hub front ends
//! translate their wire formats into calls on it and never touch storage or
//! presence directly.

pub mod embed;
pub mod moderation;
mod service;
pub mod types;
pub mod validation;

pub use embed::{EmbedFetcher, HttpEmbedFetcher, NoopEmbedFetcher};
pub use moderation::{Action, Role};
pub use service::{Actor, ChatService, ChatSettings, JoinOutcome, MAX_MUTE_MINUTES, SendRequest};
pub use types::{ChatMessage, Embed, MessageKind};
