//! Realtime push channel: one authenticated WebSocket whose lifecycle follows
//! the session.
//!
//! ARCHITECTURE
//! ============
//! - `channel`: transport-neutral channel handle and the `PushConnector` seam
//! - `ws`: tokio-tungstenite connector
//! - `message`: inbound control-message classification
//! - `manager`: the connection state machine

pub mod channel;
pub mod manager;
pub mod message;
pub mod ws;

pub use channel::{ChannelEvent, PushChannel, PushConnector};
pub use manager::{ConnectionManager, ConnectionState};
pub use ws::WsConnector;
