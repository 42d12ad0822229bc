//! Transport Port - Persistent Streaming Connection Interface
//!
//! Abstracts the socket the price stream rides on so the client's state
//! machine never depends on a concrete WebSocket library. The production
//! adapter is `adapters::feeds::price_ws`; tests script their own.

use async_trait::async_trait;
use url::Url;

use crate::error::StreamError;

/// WebSocket close code for a deliberate, normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame.
    Message(String),
    /// The remote side closed the connection (or the stream ended).
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Protocol or network failure. The transport is unusable afterwards.
    Error(String),
}

/// An open, bidirectional streaming connection.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next event.
    ///
    /// After `Closed` or `Error` has been returned the transport is done
    /// and must not be polled again.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection locally with the given code.
    async fn close(&mut self, code: u16);
}

/// Opens transports. One call per connection attempt.
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// Open a transport to `url`.
    ///
    /// # Errors
    /// Returns `StreamError::Transport` if the connection cannot be made.
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, StreamError>;
}
