//! Stream Metrics Recorder - Client Channels to Prometheus
//!
//! Listens to the price stream's status, snapshot and error channels and
//! mirrors them into `StreamMetrics`. Event-driven via tokio::select!.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::prometheus::StreamMetrics;
use crate::domain::{ConnectionStatus, PriceSnapshot};
use crate::error::StreamError;
use crate::usecases::PriceStreamClient;

/// Mirrors one client's activity into metrics.
pub struct StreamMetricsRecorder {
    metrics: Arc<StreamMetrics>,
    status_rx: watch::Receiver<ConnectionStatus>,
    reconnects_rx: watch::Receiver<u64>,
    snapshot_rx: broadcast::Receiver<PriceSnapshot>,
    error_rx: broadcast::Receiver<StreamError>,
}

impl StreamMetricsRecorder {
    /// Attach to a client. Subscribes immediately so nothing is missed
    /// between construction and `run`.
    pub fn new(metrics: Arc<StreamMetrics>, client: &PriceStreamClient) -> Self {
        Self {
            metrics,
            status_rx: client.status_changes(),
            reconnects_rx: client.reconnects_scheduled(),
            snapshot_rx: client.snapshots(),
            error_rx: client.errors(),
        }
    }

    /// Run until shutdown or until the client is gone.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        self.metrics.record_status(*self.status_rx.borrow_and_update());
        self.metrics.sync_reconnects(*self.reconnects_rx.borrow_and_update());
        info!("Stream metrics recorder started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Stream metrics recorder shutting down");
                    return;
                }
                changed = self.status_rx.changed() => {
                    if changed.is_err() {
                        debug!("Status channel closed");
                        return;
                    }
                    let status = *self.status_rx.borrow_and_update();
                    self.metrics.record_status(status);
                }
                changed = self.reconnects_rx.changed() => {
                    if changed.is_err() {
                        debug!("Reconnect channel closed");
                        return;
                    }
                    let total = *self.reconnects_rx.borrow_and_update();
                    self.metrics.sync_reconnects(total);
                }
                snapshot = self.snapshot_rx.recv() => match snapshot {
                    Ok(s) => self.metrics.record_snapshot(&s),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "Metrics recorder lagged on snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                error = self.error_rx.recv() => match error {
                    Ok(e) => {
                        if e.is_transient() {
                            debug!(error = %e, "Transient stream error");
                        } else {
                            warn!(error = %e, "Stream error");
                        }
                        self.metrics.record_error(&e);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "Metrics recorder lagged on errors");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }
}
