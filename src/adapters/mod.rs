//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (WebSockets, HTTP, file I/O). Each sub-module
//! groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: dashboard backend REST client
//! - `feeds`: tungstenite transport for the live price stream
//! - `metrics`: Prometheus metrics export and health checks
//! - `session`: auth token storage and session file watching

pub mod api;
pub mod feeds;
pub mod metrics;
pub mod session;
