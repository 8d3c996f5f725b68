//! WebSocket fan-out relay for WebRTC signaling

mod actor;
mod server;
mod types;

pub use actor::RegistryHandle;
pub use server::RelayServer;
pub use types::{BroadcastReport, ConnectionId, OutboundMessage, RelayError};
