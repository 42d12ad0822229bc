//! Stream Error Taxonomy
//!
//! Errors surfaced by the price stream client. All variants are `Clone`
//! so the same error can be returned to a caller and fanned out to
//! every observer on the `errors()` channel.

use thiserror::Error;

/// Result alias for price stream operations.
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Everything that can go wrong while streaming prices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// No auth token in the session store. Fatal for the current call,
    /// never retried automatically.
    #[error("authentication token is not available")]
    MissingToken,

    /// Endpoint could not be derived from configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// `connect()` called while a connection attempt is in flight.
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    /// Transport failed to open or failed while open.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote side closed the transport.
    #[error("transport closed (code {code}): {reason}")]
    Closed {
        /// WebSocket close code (1006 when the stream just ended).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// A single inbound message could not be parsed. Non-fatal.
    #[error("invalid price message: {0}")]
    Parse(String),

    /// Reconnect budget spent; the client stays disconnected.
    #[error("gave up after {attempts} consecutive failed connection attempts")]
    RetriesExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// No snapshot arrived within the request window.
    #[error("timed out after {0:?} waiting for a price update")]
    Timeout(std::time::Duration),

    /// The attempt was abandoned by a deliberate disconnect.
    #[error("connection attempt cancelled")]
    Cancelled,
}

impl StreamError {
    /// Whether the error leaves the connection usable.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Timeout(_))
    }
}
