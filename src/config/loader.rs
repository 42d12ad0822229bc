//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages for
//! misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

use super::AppConfig;

/// Env var overriding `api.base_url`.
pub const API_URL_ENV: &str = "BTC_STREAM_API_URL";

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config = parse_config(&content)?;

  if let Ok(url) = std::env::var(API_URL_ENV) {
    if !url.trim().is_empty() {
      config.api.base_url = Some(url);
    }
  }

  validate_config(&config)?;

  info!(
    origin = %config.api.http_origin(),
    max_attempts = config.stream.max_attempts,
    price_timeout_ms = config.stream.price_timeout_ms,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse TOML without validating.
///
/// # Errors
/// If the TOML is malformed or has wrongly typed fields.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  toml::from_str(content).with_context(|| "Failed to parse config.toml")
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive delays and timeouts
/// - Retry floor not above the ceiling
/// - Origins that parse as URLs and resolve to a stream endpoint
pub fn validate_config(config: &AppConfig) -> Result<()> {
  // Stream validation
  let stream = &config.stream;
  anyhow::ensure!(
    stream.max_attempts >= 1,
    "stream.max_attempts must be at least 1, got {}",
    stream.max_attempts
  );
  anyhow::ensure!(
    stream.initial_retry_delay_ms > 0,
    "stream.initial_retry_delay_ms must be positive"
  );
  anyhow::ensure!(
    stream.initial_retry_delay_ms <= stream.max_retry_delay_ms,
    "stream.initial_retry_delay_ms ({}) must not exceed max_retry_delay_ms ({})",
    stream.initial_retry_delay_ms,
    stream.max_retry_delay_ms
  );
  anyhow::ensure!(
    stream.price_timeout_ms > 0,
    "stream.price_timeout_ms must be positive"
  );
  anyhow::ensure!(
    stream.snapshot_buffer > 0,
    "stream.snapshot_buffer must be positive"
  );

  // API validation
  anyhow::ensure!(config.api.timeout_ms > 0, "api.timeout_ms must be positive");
  Url::parse(&config.api.page_origin)
    .with_context(|| format!("api.page_origin is not a URL: {}", config.api.page_origin))?;
  config
    .api
    .stream_endpoint()
    .context("api.base_url / api.page_origin do not resolve to a stream endpoint")?;

  // Session validation
  anyhow::ensure!(
    config.session.watch_interval_secs > 0,
    "session.watch_interval_secs must be positive"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = parse_config("").unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.app.log_level, "info");
    assert_eq!(config.stream.max_attempts, 5);
    assert_eq!(config.stream.initial_retry_delay_ms, 1_000);
    assert_eq!(config.stream.max_retry_delay_ms, 30_000);
    assert_eq!(config.stream.price_timeout_ms, 10_000);
    assert!(config.health.enabled);
    assert_eq!(
      config.api.stream_endpoint().unwrap().base().as_str(),
      "ws://localhost:3000/api/ws/btc-price"
    );
  }

  #[test]
  fn test_base_url_wins_over_page_origin() {
    let config = parse_config(
      r#"
      [api]
      base_url = "https://api.example.com"
      page_origin = "http://localhost:3000"
      "#,
    )
    .unwrap();

    assert_eq!(config.api.http_origin(), "https://api.example.com");
    assert_eq!(
      config.api.stream_endpoint().unwrap().base().as_str(),
      "wss://api.example.com/api/ws/btc-price"
    );
  }

  #[test]
  fn test_settings_mapping() {
    let config = parse_config(
      r#"
      [stream]
      max_attempts = 3
      initial_retry_delay_ms = 500
      max_retry_delay_ms = 4000
      price_timeout_ms = 2000
      "#,
    )
    .unwrap();
    let settings = config.stream.settings();

    assert_eq!(settings.backoff.max_attempts, 3);
    assert_eq!(settings.backoff.initial_delay.as_millis(), 500);
    assert_eq!(settings.backoff.max_delay.as_millis(), 4_000);
    assert_eq!(settings.price_timeout.as_millis(), 2_000);
  }

  #[test]
  fn test_rejects_inverted_delays() {
    let config = parse_config(
      r#"
      [stream]
      initial_retry_delay_ms = 60000
      max_retry_delay_ms = 30000
      "#,
    )
    .unwrap();
    assert!(validate_config(&config).is_err());
  }

  #[test]
  fn test_rejects_zero_attempts() {
    let config = parse_config("[stream]\nmax_attempts = 0\n").unwrap();
    assert!(validate_config(&config).is_err());
  }

  #[test]
  fn test_rejects_unsupported_origin() {
    let config = parse_config("[api]\nbase_url = \"ftp://example.com\"\n").unwrap();
    assert!(validate_config(&config).is_err());
  }
}
