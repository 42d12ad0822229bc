//! BTC Price Stream — Entry Point
//!
//! Initializes configuration, logging, the session, and the live price
//! stream client. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + env overrides + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build the session store (BTC_STREAM_AUTH_TOKEN, then session file)
//! 4. Refresh the access token if only a refresh token is known
//! 5. Create the tungstenite connector and the PriceStreamClient
//! 6. Register a logging subscriber
//! 7. Spawn health server, metrics recorder and session watcher
//! 8. Connect (failures are retried in the background)
//! 9. Wait for SIGINT → graceful shutdown (signal→disconnect→join)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use btc_price_stream::adapters::api::DashboardClient;
use btc_price_stream::adapters::feeds::WsConnector;
use btc_price_stream::adapters::metrics::{
    HealthServer, HealthState, StreamMetrics, StreamMetricsRecorder,
};
use btc_price_stream::adapters::session::{SessionStore, TokenWatcher};
use btc_price_stream::config;
use btc_price_stream::ports::TokenSource;
use btc_price_stream::PriceStreamClient;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting BTC price stream client"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Session: env token, then session file ────────────
    let session = Arc::new(SessionStore::from_env());
    if let Some(path) = &config.session.token_file {
        if let Err(e) = session.load_file(path) {
            warn!(error = %e, "Session file not loaded, continuing without it");
        }
    }

    if session.auth_token().is_none() && session.refresh_token().is_some() {
        let dashboard = DashboardClient::new(Arc::clone(&session), config.api.client_config())
            .context("Failed to create dashboard client")?;
        match dashboard.refresh_auth().await {
            Ok(true) => info!("Access token restored from refresh token"),
            Ok(false) => warn!("Refresh token rejected, starting logged out"),
            Err(e) => warn!(error = %e, "Token refresh failed"),
        }
    }

    info!(
        has_token = session.has_auth_token(),
        authenticated = session.is_authenticated(),
        "Session ready"
    );

    // ── 5. Price stream client ──────────────────────────────
    let endpoint = config
        .api
        .stream_endpoint()
        .context("Failed to resolve price stream endpoint")?;
    let connector = Arc::new(WsConnector::new(config.api.timeout()));
    let client = Arc::new(PriceStreamClient::new(
        connector,
        Arc::clone(&session) as Arc<dyn TokenSource>,
        endpoint,
        config.stream.settings(),
    ));

    // ── 6. Log every price update ───────────────────────────
    client
        .on_price_update(|price| info!(%price, "BTC price update"))
        .detach();

    // ── 7. Background tasks ─────────────────────────────────
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let metrics = Arc::new(StreamMetrics::new().context("Failed to create metrics")?);

    let recorder = StreamMetricsRecorder::new(Arc::clone(&metrics), &client);
    tasks.push(tokio::spawn(recorder.run(shutdown_tx.subscribe())));

    if config.health.enabled {
        let server = HealthServer::new(
            HealthState {
                client: Arc::clone(&client),
                metrics: Arc::clone(&metrics),
            },
            config.health.bind_address.clone(),
        );
        let health_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(health_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }));
    }

    if let Some(path) = config.session.token_file.clone() {
        let watcher = TokenWatcher::new(
            path,
            Duration::from_secs(config.session.watch_interval_secs),
            Arc::clone(&session),
            Arc::clone(&client),
        );
        tasks.push(tokio::spawn(watcher.run(shutdown_tx.subscribe())));
    }

    // ── 8. Connect ──────────────────────────────────────────
    match client.connect().await {
        Ok(()) => info!("Price stream connected"),
        Err(e) => error!(error = %e, "Initial price stream connection failed"),
    }

    info!("All tasks spawned — client is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    // Stop watchers first so nothing reconnects behind our back.
    let _ = shutdown_tx.send(());
    client.disconnect().await;

    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("Background task did not stop within 5s");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
