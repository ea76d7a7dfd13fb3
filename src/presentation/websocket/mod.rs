//! WebSocket Gateway
//!
//! Real-time delivery: connection registry, room broadcast groups, and the
//! per-connection protocol handler.

pub mod gateway;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use gateway::ChatGateway;
pub use handler::ws_handler;
pub use messages::{GatewayReceive, GatewaySend, OpCode};
pub use registry::ConnectionRegistry;
pub use session::SessionState;
