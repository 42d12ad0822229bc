//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Transport` / `TransportConnector`: the streaming price connection
//! - `TokenSource`: the externally managed auth token

pub mod token_source;
pub mod transport;

pub use token_source::TokenSource;
pub use transport::{Transport, TransportConnector, TransportEvent};
