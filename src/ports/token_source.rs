//! Token Source Port - Opaque Auth Token Provider
//!
//! The session layer owns the token; the stream client only asks for it
//! when it needs to open a transport.

/// Provides the current authentication token, if any.
pub trait TokenSource: Send + Sync + 'static {
    /// Current auth token. `None` when logged out.
    fn auth_token(&self) -> Option<String>;
}
