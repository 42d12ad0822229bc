//! Configuration Module - TOML-based Client Configuration
//!
//! Loads and validates configuration from `config.toml` with
//! environment variable overrides. Backend origins, stream path and
//! reconnect tunables are externalized here - nothing is hardcoded in
//! the client.

pub mod loader;

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::api::DashboardClientConfig;
use crate::domain::{BackoffPolicy, StreamEndpoint, DEFAULT_STREAM_PATH};
use crate::error::StreamError;
use crate::usecases::StreamSettings;

/// Top-level configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the client connects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
  /// Process identity and logging.
  #[serde(default)]
  pub app: AppSection,
  /// Backend endpoints.
  #[serde(default)]
  pub api: ApiConfig,
  /// Reconnect and price wait tunables.
  #[serde(default)]
  pub stream: StreamConfig,
  /// Session token sources.
  #[serde(default)]
  pub session: SessionConfig,
  /// Health and metrics server.
  #[serde(default)]
  pub health: HealthConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable name for logs.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for AppSection {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Explicit backend origin. When unset the page origin is used.
  #[serde(default)]
  pub base_url: Option<String>,
  /// Origin the dashboard is served from.
  #[serde(default = "default_page_origin")]
  pub page_origin: String,
  /// Path of the price stream on the backend.
  #[serde(default = "default_stream_path")]
  pub stream_path: String,
  /// REST and handshake timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      page_origin: default_page_origin(),
      stream_path: default_stream_path(),
      timeout_ms: default_timeout_ms(),
    }
  }
}

impl ApiConfig {
  /// Origin REST calls go to.
  pub fn http_origin(&self) -> &str {
    self
      .base_url
      .as_deref()
      .map(str::trim)
      .filter(|u| !u.is_empty())
      .unwrap_or(self.page_origin.as_str())
  }

  /// WebSocket endpoint of the price stream.
  ///
  /// # Errors
  /// If the origin is not an http(s)/ws(s) URL.
  pub fn stream_endpoint(&self) -> Result<StreamEndpoint, StreamError> {
    StreamEndpoint::resolve(self.base_url.as_deref(), &self.page_origin, &self.stream_path)
  }

  /// Request timeout.
  pub const fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  /// Settings for the dashboard REST client.
  pub fn client_config(&self) -> DashboardClientConfig {
    DashboardClientConfig {
      base_url: self.http_origin().to_string(),
      timeout: self.timeout(),
      ..DashboardClientConfig::default()
    }
  }
}

/// Price stream tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
  /// Connection attempts before giving up.
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// First reconnect delay in milliseconds.
  #[serde(default = "default_initial_retry_delay_ms")]
  pub initial_retry_delay_ms: u64,
  /// Reconnect delay ceiling in milliseconds.
  #[serde(default = "default_max_retry_delay_ms")]
  pub max_retry_delay_ms: u64,
  /// `get_bitcoin_price()` window in milliseconds.
  #[serde(default = "default_price_timeout_ms")]
  pub price_timeout_ms: u64,
  /// Buffered snapshots per broadcast receiver.
  #[serde(default = "default_snapshot_buffer")]
  pub snapshot_buffer: usize,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      initial_retry_delay_ms: default_initial_retry_delay_ms(),
      max_retry_delay_ms: default_max_retry_delay_ms(),
      price_timeout_ms: default_price_timeout_ms(),
      snapshot_buffer: default_snapshot_buffer(),
    }
  }
}

impl StreamConfig {
  /// Client settings derived from this section.
  pub const fn settings(&self) -> StreamSettings {
    StreamSettings {
      backoff: BackoffPolicy {
        max_attempts: self.max_attempts,
        initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
        max_delay: Duration::from_millis(self.max_retry_delay_ms),
      },
      price_timeout: Duration::from_millis(self.price_timeout_ms),
      channel_capacity: self.snapshot_buffer,
    }
  }
}

/// Session token sources.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  /// JSON session file, re-read on change.
  #[serde(default)]
  pub token_file: Option<PathBuf>,
  /// Session file poll period (seconds).
  #[serde(default = "default_watch_interval")]
  pub watch_interval_secs: u64,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      token_file: None,
      watch_interval_secs: default_watch_interval(),
    }
  }
}

/// Health and metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
  /// Serve `/live`, `/ready`, `/price` and `/metrics`.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Server bind address.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_bind_address(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "btc-price-stream".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_page_origin() -> String {
  "http://localhost:3000".to_string()
}

fn default_stream_path() -> String {
  DEFAULT_STREAM_PATH.to_string()
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_max_attempts() -> u32 {
  5
}

fn default_initial_retry_delay_ms() -> u64 {
  1_000
}

fn default_max_retry_delay_ms() -> u64 {
  30_000
}

fn default_price_timeout_ms() -> u64 {
  10_000
}

fn default_snapshot_buffer() -> usize {
  64
}

fn default_watch_interval() -> u64 {
  5
}

fn default_true() -> bool {
  true
}

fn default_bind_address() -> String {
  "0.0.0.0:9090".to_string()
}
