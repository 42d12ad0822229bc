//! BTC Price WebSocket Transport - tokio-tungstenite Adapter
//!
//! Implements the `Transport` and `TransportConnector` ports over a
//! real WebSocket. The connector only opens sockets; reconnect policy
//! lives in the price stream client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};
use url::Url;

use crate::error::StreamError;
use crate::ports::transport::ABNORMAL_CLOSURE;
use crate::ports::{Transport, TransportConnector, TransportEvent};

/// Close code used when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens WebSocket connections to the price stream.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// Upper bound on TCP + TLS + upgrade handshake.
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the given handshake timeout.
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl TransportConnector for WsConnector {
    // The URL carries the auth token; never log it.
    #[instrument(skip_all)]
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, StreamError> {
        let (ws, response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                StreamError::Transport(format!(
                    "WebSocket handshake timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| StreamError::Transport(format!("WebSocket connection failed: {e}")))?;

        debug!(status = %response.status(), "Price WebSocket handshake complete");

        Ok(Box::new(WsTransport { ws }))
    }
}

/// One open price WebSocket.
struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Message(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return TransportEvent::Message(text),
                    Err(_) => debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    // Pong is handled automatically by tungstenite
                    debug!(len = data.len(), "Price stream ping received");
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |f| (u16::from(f.code), f.reason.to_string()),
                    );
                    return TransportEvent::Closed { code, reason };
                }
                Some(Err(e)) => return TransportEvent::Error(format!("WebSocket error: {e}")),
                None => {
                    return TransportEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "WebSocket stream ended".to_string(),
                    };
                }
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "client disconnect".into(),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
