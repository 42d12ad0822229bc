//! Prometheus Metrics Registry - Price Stream Observability
//!
//! Registers the stream metrics and renders them in the text exposition
//! format for the `/metrics` endpoint. All metrics follow the naming
//! convention `btc_price_stream_*`.

use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use rust_decimal::prelude::ToPrimitive;

use crate::domain::{ConnectionStatus, PriceSnapshot};
use crate::error::StreamError;

/// Centralized Prometheus metrics for the price stream.
pub struct StreamMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Parsed snapshots delivered to subscribers.
    pub snapshots_received: IntCounter,
    /// Reconnects scheduled after unexpected closes.
    pub reconnects_scheduled: IntCounter,
    /// Errors reported by the client, by kind.
    pub stream_errors: IntCounterVec,
    /// One gauge per status label; exactly one is 1 at a time.
    pub connection_status: GaugeVec,
    /// Last aggregated BTC price.
    pub last_price: Gauge,
    /// Server timestamp of the last snapshot (Unix seconds).
    pub last_update_seconds: Gauge,
    /// Last price per source exchange.
    pub source_price: GaugeVec,
}

impl StreamMetrics {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let snapshots_received = IntCounter::new(
            "btc_price_stream_snapshots_total",
            "Price snapshots received and delivered",
        )?;

        let reconnects_scheduled = IntCounter::new(
            "btc_price_stream_reconnects_scheduled_total",
            "Reconnects scheduled by the backoff policy",
        )?;

        let stream_errors = IntCounterVec::new(
            Opts::new("btc_price_stream_errors_total", "Errors reported by the price stream"),
            &["kind"],
        )?;

        let connection_status = GaugeVec::new(
            Opts::new(
                "btc_price_stream_connection_status",
                "Connection status (1 for the current status label)",
            ),
            &["status"],
        )?;

        let last_price = Gauge::new("btc_price_stream_last_price_usd", "Last BTC price in USD")?;

        let last_update_seconds = Gauge::new(
            "btc_price_stream_last_update_timestamp_seconds",
            "Server timestamp of the last price snapshot",
        )?;

        let source_price = GaugeVec::new(
            Opts::new("btc_price_stream_source_price_usd", "Last BTC price per source"),
            &["source"],
        )?;

        registry.register(Box::new(snapshots_received.clone()))?;
        registry.register(Box::new(reconnects_scheduled.clone()))?;
        registry.register(Box::new(stream_errors.clone()))?;
        registry.register(Box::new(connection_status.clone()))?;
        registry.register(Box::new(last_price.clone()))?;
        registry.register(Box::new(last_update_seconds.clone()))?;
        registry.register(Box::new(source_price.clone()))?;

        let metrics = Self {
            registry,
            snapshots_received,
            reconnects_scheduled,
            stream_errors,
            connection_status,
            last_price,
            last_update_seconds,
            source_price,
        };
        metrics.record_status(ConnectionStatus::Disconnected);
        Ok(metrics)
    }

    /// Record a delivered snapshot.
    pub fn record_snapshot(&self, snapshot: &PriceSnapshot) {
        self.snapshots_received.inc();
        if let Some(price) = snapshot.price.to_f64() {
            self.last_price.set(price);
        }
        self.last_update_seconds
            .set(snapshot.timestamp_ms as f64 / 1000.0);
        for (source, price) in &snapshot.sources {
            if let Some(price) = price.to_f64() {
                self.source_price.with_label_values(&[source.as_str()]).set(price);
            }
        }
    }

    /// Count an error by kind.
    pub fn record_error(&self, error: &StreamError) {
        self.stream_errors
            .with_label_values(&[error_kind(error)])
            .inc();
    }

    /// Bring the reconnect counter up to the client's running total.
    pub fn sync_reconnects(&self, total: u64) {
        let seen = self.reconnects_scheduled.get();
        if total > seen {
            self.reconnects_scheduled.inc_by(total - seen);
        }
    }

    /// Flip the status gauges to `status`.
    pub fn record_status(&self, status: ConnectionStatus) {
        for label in ConnectionStatus::ALL {
            let value = if label == status { 1.0 } else { 0.0 };
            self.connection_status
                .with_label_values(&[label.as_str()])
                .set(value);
        }
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Metric label for an error.
const fn error_kind(error: &StreamError) -> &'static str {
    match error {
        StreamError::MissingToken => "missing_token",
        StreamError::Config(_) => "config",
        StreamError::AlreadyConnecting => "already_connecting",
        StreamError::Transport(_) => "transport",
        StreamError::Closed { .. } => "closed",
        StreamError::Parse(_) => "parse",
        StreamError::RetriesExhausted { .. } => "retries_exhausted",
        StreamError::Timeout(_) => "timeout",
        StreamError::Cancelled => "cancelled",
    }
}
