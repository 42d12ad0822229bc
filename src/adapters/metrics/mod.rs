//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics for the price stream, a recorder task that feeds
//! them from the client's channels, and the axum health server
//! (/live, /ready, /price, /metrics).

pub mod health;
pub mod prometheus;
pub mod recorder;

pub use self::health::{HealthServer, HealthState};
pub use self::prometheus::StreamMetrics;
pub use self::recorder::StreamMetricsRecorder;
