//! tokio-tungstenite implementation of [`PushConnector`].
//!
//! Each open channel gets one task that relays between the socket and the
//! channel's mpsc pair. The task ends when either side closes.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tracing::{debug, warn};

use super::channel::{ChannelEvent, PushChannel, PushConnector};
use crate::error::ApiError;
use crate::http::HttpClient;

#[derive(Clone, Default)]
pub struct WsConnector {
    /// Source of the session cookie sent with the upgrade request.
    cookies: Option<HttpClient>,
}

impl WsConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate upgrades with the cookies held by `http`.
    #[must_use]
    pub fn with_cookies(http: HttpClient) -> Self {
        Self { cookies: Some(http) }
    }
}

#[async_trait::async_trait]
impl PushConnector for WsConnector {
    async fn open(&self, url: &str) -> Result<PushChannel, ApiError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;
        if let Some(cookie) = self.cookies.as_ref().and_then(|http| http.cookie_header(url)) {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                request.headers_mut().insert(COOKIE, value);
            }
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        debug!(%url, "ws: handshake complete");

        let (mut write, mut read) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (events_tx, events) = mpsc::unbounded_channel::<ChannelEvent>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = outbound_rx.recv() => {
                        let Some(text) = outgoing else {
                            // Local close: every sender is gone.
                            let _ = write.send(WsMessage::Close(None)).await;
                            break;
                        };
                        if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                            warn!(error = %e, "ws: send failed");
                            let _ = events_tx.send(ChannelEvent::Error(e.to_string()));
                            let _ = events_tx.send(ChannelEvent::Closed);
                            break;
                        }
                    }
                    incoming = read.next() => match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            let _ = events_tx.send(ChannelEvent::Message(text.as_str().to_owned()));
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            let _ = events_tx.send(ChannelEvent::Closed);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = events_tx.send(ChannelEvent::Error(e.to_string()));
                            let _ = events_tx.send(ChannelEvent::Closed);
                            break;
                        }
                    }
                }
            }
        });

        Ok(PushChannel { outbound, events })
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
