//! Core handler infrastructure: the per-line context and the dispatch table.

pub mod context;
pub mod registry;

pub use context::{
    Account, Context, Handler, HandshakeState, IrcServices, SaslState, ServerInfo,
};
pub use registry::Registry;
