//! Health Check Server - Liveness, Readiness and Price Checks
//!
//! Exposes /live, /ready, /price and /metrics via axum 0.7. Readiness
//! follows the price stream's connection status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use super::prometheus::StreamMetrics;
use crate::domain::{ConnectionStatus, PriceSnapshot};
use crate::usecases::PriceStreamClient;

/// Shared state for the health handlers.
#[derive(Clone)]
pub struct HealthState {
    /// The price stream being reported on.
    pub client: Arc<PriceStreamClient>,
    /// Metrics rendered on /metrics.
    pub metrics: Arc<StreamMetrics>,
}

/// Body of `/price`.
#[derive(Debug, Serialize)]
struct PriceView {
    price: Decimal,
    timestamp_ms: i64,
    observed_at: Option<DateTime<Utc>>,
    sources: BTreeMap<String, Decimal>,
    spread: Option<Decimal>,
    status: ConnectionStatus,
}

impl PriceView {
    fn new(snapshot: PriceSnapshot, status: ConnectionStatus) -> Self {
        Self {
            observed_at: snapshot.observed_at(),
            spread: snapshot.source_spread(),
            price: snapshot.price,
            timestamp_ms: snapshot.timestamp_ms,
            sources: snapshot.sources,
            status,
        }
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// State shared with all handlers.
    state: HealthState,
    /// Bind address (default 0.0.0.0:9090 from config).
    bind_address: String,
}

impl HealthServer {
    /// Create a new health server.
    pub const fn new(state: HealthState, bind_address: String) -> Self {
        Self {
            state,
            bind_address,
        }
    }

    /// Build the router. Split out so handlers can be exercised in tests.
    pub fn router(state: HealthState) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/price", get(Self::price))
            .route("/metrics", get(Self::metrics))
            .with_state(state)
    }

    /// Serve until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness check: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness check: 200 only while the price stream is connected.
    async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
        let status = state.client.connection_status();
        if status == ConnectionStatus::Connected {
            (StatusCode::OK, "READY".to_string())
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, format!("NOT READY ({status})"))
        }
    }

    /// Latest snapshot, or 503 before the first one.
    async fn price(State(state): State<HealthState>) -> Response {
        let status = state.client.connection_status();
        match state.client.latest_snapshot() {
            Some(snapshot) => Json(PriceView::new(snapshot, status)).into_response(),
            None => (StatusCode::SERVICE_UNAVAILABLE, "NO PRICE YET").into_response(),
        }
    }

    /// Prometheus text exposition.
    async fn metrics(State(state): State<HealthState>) -> Response {
        match state.metrics.render() {
            Ok(body) => body.into_response(),
            Err(e) => {
                error!(error = %e, "Failed to render metrics");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StreamEndpoint, DEFAULT_STREAM_PATH};
    use crate::error::StreamError;
    use crate::ports::{TokenSource, Transport, TransportConnector};
    use crate::usecases::StreamSettings;

    struct Refusing;

    #[async_trait::async_trait]
    impl TransportConnector for Refusing {
        async fn open(&self, _url: &url::Url) -> Result<Box<dyn Transport>, StreamError> {
            Err(StreamError::Transport("refused".into()))
        }
    }

    struct NoToken;

    impl TokenSource for NoToken {
        fn auth_token(&self) -> Option<String> {
            None
        }
    }

    fn state() -> HealthState {
        let endpoint =
            StreamEndpoint::resolve(None, "http://localhost:8080", DEFAULT_STREAM_PATH).unwrap();
        HealthState {
            client: Arc::new(PriceStreamClient::new(
                Arc::new(Refusing),
                Arc::new(NoToken),
                endpoint,
                StreamSettings::default(),
            )),
            metrics: Arc::new(StreamMetrics::new().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_not_ready_while_disconnected() {
        let response = HealthServer::readiness(State(state())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_price_unavailable_before_first_snapshot() {
        let response = HealthServer::price(State(state())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_price_view_carries_time_and_spread() {
        let snapshot = PriceSnapshot::parse(
            r#"{"price":65000,"timestamp":1700000000000,"sources":{"binance":65010,"kraken":64990.5}}"#,
        )
        .unwrap();
        let view = serde_json::to_value(PriceView::new(snapshot, ConnectionStatus::Connected)).unwrap();

        assert_eq!(view["observed_at"], "2023-11-14T22:13:20Z");
        assert_eq!(view["spread"], "19.5");
        assert_eq!(view["status"], "connected");
    }

    #[tokio::test]
    async fn test_metrics_render_ok() {
        let response = HealthServer::metrics(State(state())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
