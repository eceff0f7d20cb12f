//! Hub protocol: JSON events over WebSocket for the native client.

mod gateway;
pub mod protocol;
pub mod transport;

pub use gateway::HubGateway;
pub use protocol::{ChannelInfo, HubEvent, HubRequest, UserInfo};
pub use transport::{HubConnections, HubTransport, Outbound};
