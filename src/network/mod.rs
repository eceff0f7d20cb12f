//! Network module.
//!
//! Contains the IRC Gateway (TCP listener) and the per-client Connection loop.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::IrcGateway;
