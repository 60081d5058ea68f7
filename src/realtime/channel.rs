//! Transport-neutral handle to one open push channel.

use tokio::sync::mpsc;

use crate::error::ApiError;

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame from the server.
    Message(String),
    /// A transport error. A `Closed` normally follows.
    Error(String),
    /// The server or the network closed the channel.
    Closed,
}

/// One open channel. Dropping `outbound` asks the transport to close it.
pub struct PushChannel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    /// Open a channel to `url`. Resolves once the handshake completes.
    async fn open(&self, url: &str) -> Result<PushChannel, ApiError>;
}
