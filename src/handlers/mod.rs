//! IRC command handlers.
//!
//! Each command is a [`Handler`] registered by name in the [`Registry`].
//! Handlers translate between IRC lines and [`crate::chat::ChatService`]
//! operations; business rules live in the service.

mod cap;
mod channel;
mod connection;
mod core;
mod helpers;
mod messaging;
mod mode;
mod server_query;
mod user_query;
mod user_status;

pub use self::core::{
    Account, Context, Handler, HandshakeState, IrcServices, Registry, SaslState, ServerInfo,
};

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;
