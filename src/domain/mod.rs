//! Domain layer - Price stream core types.
//!
//! Pure logic with no I/O: the price snapshot and its wire parsing, the
//! reconnect backoff policy, endpoint resolution, and the public
//! connection status. Everything here is testable in isolation.

pub mod backoff;
pub mod endpoint;
pub mod snapshot;
pub mod status;

// Re-export core types for convenience
pub use backoff::BackoffPolicy;
pub use endpoint::{StreamEndpoint, DEFAULT_STREAM_PATH};
pub use snapshot::PriceSnapshot;
pub use status::ConnectionStatus;
