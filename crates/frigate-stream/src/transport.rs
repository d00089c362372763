//! Transport abstraction for the event stream.
//!
//! The client only needs "connect and give me text frames". Keeping that behind
//! [`StreamTransport`] lets the reconnect loop be exercised without a socket.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, trace};

use crate::error::{Result, StreamError};

/// Stream of text frames from one connection. Ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Something that can open a connection to the event source.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a new connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<FrameStream>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<FrameStream> {
        let (ws_stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(endpoint))
            .await
            .map_err(|_| {
                StreamError::timeout(format!(
                    "WebSocket handshake with {} exceeded {:?}",
                    endpoint, self.connect_timeout
                ))
            })?
            .map_err(|e| StreamError::connection(format!("{}: {}", endpoint, e)))?;

        debug!(
            "WebSocket handshake with {} completed ({})",
            endpoint,
            response.status()
        );

        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => Some(String::from_utf8(data.to_vec()).map_err(|e| {
                    StreamError::protocol(format!("binary frame is not valid UTF-8: {}", e))
                })),
                Ok(Message::Close(frame)) => {
                    debug!("WebSocket close frame received: {:?}", frame);
                    None
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    trace!("Skipping WebSocket control frame");
                    None
                }
                Err(e) => Some(Err(StreamError::connection(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}
