//! Dashboard HTTP Client - Authenticated REST API Client
//!
//! Wraps reqwest with bearer auth from the session store, GET retries
//! with exponential backoff, and session clearing on 401 for all
//! interactions with the trading bot backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::types::{
  AccountBalance, ApiEnvelope, BotStatus, EntryAutomation, LnMarketsConfig,
  LnMarketsConfigRequest, LoginRequest, LoginResponse, MarginProtection, Position, PriceAlert,
  PriceLevel, RefreshRequest, RegisterRequest, TakeProfit,
};
use crate::adapters::session::{is_valid_token_format, SessionStore};
use crate::ports::TokenSource;

/// Status codes worth retrying a GET on.
const RETRY_STATUS_CODES: [u16; 7] = [408, 413, 429, 500, 502, 503, 504];

/// Configuration for the dashboard HTTP client.
#[derive(Debug, Clone)]
pub struct DashboardClientConfig {
  /// Base URL of the backend API.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum retries for GET requests.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for DashboardClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      timeout: Duration::from_secs(10),
      max_retries: 2,
      retry_base_delay: Duration::from_millis(200),
    }
  }
}

/// REST client for the trading bot backend.
pub struct DashboardClient {
  /// Underlying HTTP client.
  http: Client,
  /// Session (bearer token source, cleared on 401).
  session: Arc<SessionStore>,
  /// Client configuration.
  config: DashboardClientConfig,
}

impl DashboardClient {
  /// Create a new dashboard client.
  pub fn new(session: Arc<SessionStore>, config: DashboardClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      session,
      config,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// Execute a request with auth, retries (GET only) and 401 handling.
  async fn execute<B: Serialize + Sync>(
    &self,
    method: Method,
    path: &str,
    body: Option<&B>,
  ) -> Result<Response> {
    let retries = if method == Method::GET {
      self.config.max_retries
    } else {
      0
    };
    let mut last_error = None;

    for attempt in 0..=retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis() as u64, path, "Retrying request");
        sleep(delay).await;
      }

      let mut req = self.http.request(method.clone(), self.url(path));
      if let Some(token) = self.session.auth_token().filter(|t| is_valid_token_format(t)) {
        req = req.bearer_auth(token);
      }
      if let Some(body) = body {
        req = req.json(body);
      }

      match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => return Ok(response),
          StatusCode::UNAUTHORIZED => {
            warn!(path, "Backend rejected credentials, clearing session");
            self.session.clear_all();
            anyhow::bail!("Unauthorized request to {path}: session cleared");
          }
          status if is_retryable(status) => {
            warn!(status = %status, path, "Retryable API error");
            last_error = Some(anyhow::anyhow!("API error {status} on {path}"));
          }
          status => {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error {status} on {path}: {}", error_message(&body));
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, path, "Request failed");
          last_error = Some(e.into());
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded for {path}")))
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let response = self.execute::<()>(Method::GET, path, None).await?;
    let body = response.text().await.context("Failed to read response body")?;
    decode(&body).with_context(|| format!("Invalid response from {path}"))
  }

  async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
  where
    B: Serialize + Sync,
    T: DeserializeOwned,
  {
    let response = self.execute(Method::POST, path, Some(body)).await?;
    let text = response.text().await.context("Failed to read response body")?;
    decode(&text).with_context(|| format!("Invalid response from {path}"))
  }

  async fn post_unit<B: Serialize + Sync>(&self, path: &str, body: Option<&B>) -> Result<()> {
    self.execute(Method::POST, path, body).await?;
    Ok(())
  }

  // ── Auth ────────────────────────────────────────────────

  /// Create an account.
  #[instrument(skip(self, request), fields(username = %request.username))]
  pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
    self.post_unit("/api/auth/register", Some(request)).await?;
    info!("Account registered");
    Ok(())
  }

  /// Log in and store the returned tokens and profile in the session.
  ///
  /// The price stream is not touched; callers follow up with
  /// `PriceStreamClient::update_auth_token`.
  #[instrument(skip(self, request), fields(username = %request.username))]
  pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
    let response: LoginResponse = self.post_json("/api/auth/login", request).await?;
    let token = response
      .token
      .clone()
      .context("Login response did not include a token")?;

    self.session.set_tokens(Some(token), response.refresh_token.clone());
    if let Some(user) = response.user.clone() {
      self.session.set_user(user);
    }
    info!("Logged in");
    Ok(response)
  }

  /// Exchange the refresh token for a new access token.
  ///
  /// Returns `false` (and clears the session) when there is no refresh
  /// token or the backend refuses it.
  #[instrument(skip(self))]
  pub async fn refresh_auth(&self) -> Result<bool> {
    let Some(refresh_token) = self.session.refresh_token() else {
      debug!("No refresh token, cannot refresh");
      return Ok(false);
    };

    let request = RefreshRequest { refresh_token };
    match self.post_json::<_, LoginResponse>("/auth/refresh", &request).await {
      Ok(LoginResponse {
        token: Some(token),
        refresh_token,
        ..
      }) => {
        self.session.set_tokens(Some(token), refresh_token);
        info!("Access token refreshed");
        Ok(true)
      }
      Ok(_) => {
        warn!("Refresh response had no token, clearing session");
        self.session.clear_all();
        Ok(false)
      }
      Err(e) => {
        warn!(error = %e, "Token refresh failed, clearing session");
        self.session.clear_all();
        Ok(false)
      }
    }
  }

  /// Drop the local session.
  pub fn logout(&self) {
    self.session.clear_all();
  }

  // ── Exchange credentials ────────────────────────────────

  /// Stored LN Markets credentials.
  pub async fn lnmarkets_config(&self) -> Result<LnMarketsConfig> {
    self.get_json("/api/lnmarkets/config").await
  }

  /// Store LN Markets credentials.
  #[instrument(skip(self, request), fields(is_testnet = request.is_testnet))]
  pub async fn set_lnmarkets_config(&self, request: &LnMarketsConfigRequest) -> Result<()> {
    anyhow::ensure!(
      !request.api_key.trim().is_empty()
        && !request.secret_key.trim().is_empty()
        && !request.passphrase.trim().is_empty(),
      "LN Markets api_key, secret_key and passphrase are required"
    );
    self.post_unit("/api/lnmarkets/config", Some(request)).await?;
    info!("LN Markets credentials stored");
    Ok(())
  }

  // ── Trading configuration ───────────────────────────────

  /// Current margin protection settings.
  pub async fn margin_protection(&self) -> Result<MarginProtection> {
    self.get_json("/api/trading/margin-protection").await
  }

  /// Update margin protection.
  pub async fn set_margin_protection(&self, config: &MarginProtection) -> Result<()> {
    self.post_unit("/api/trading/margin-protection", Some(config)).await
  }

  /// Current take-profit settings.
  pub async fn take_profit(&self) -> Result<TakeProfit> {
    self.get_json("/api/trading/take-profit").await
  }

  /// Update take-profit.
  pub async fn set_take_profit(&self, config: &TakeProfit) -> Result<()> {
    self.post_unit("/api/trading/take-profit", Some(config)).await
  }

  /// Current entry automation settings.
  pub async fn entry_automation(&self) -> Result<EntryAutomation> {
    self.get_json("/api/trading/entry-automation").await
  }

  /// Update entry automation.
  pub async fn set_entry_automation(&self, config: &EntryAutomation) -> Result<()> {
    self.post_unit("/api/trading/entry-automation", Some(config)).await
  }

  /// Current price alert band.
  pub async fn price_alert(&self) -> Result<PriceAlert> {
    self.get_json("/api/trading/price-alert").await
  }

  /// Update the price alert band.
  pub async fn set_price_alert(&self, config: &PriceAlert) -> Result<()> {
    anyhow::ensure!(
      config.min_price < config.max_price,
      "Price alert min_price ({}) must be below max_price ({})",
      config.min_price,
      config.max_price
    );
    self.post_unit("/api/trading/price-alert", Some(config)).await
  }

  // ── Bot ─────────────────────────────────────────────────

  /// Start the trading bot.
  pub async fn start_bot(&self) -> Result<()> {
    self.post_unit::<()>("/api/trading/bot/start", None).await
  }

  /// Stop the trading bot.
  pub async fn stop_bot(&self) -> Result<()> {
    self.post_unit::<()>("/api/trading/bot/stop", None).await
  }

  /// Trading bot status.
  pub async fn bot_status(&self) -> Result<BotStatus> {
    self.get_json("/api/trading/bot/status").await
  }

  // ── Trading ─────────────────────────────────────────────

  /// Exchange account balance.
  pub async fn account_balance(&self) -> Result<AccountBalance> {
    self.get_json("/api/trading/account/balance").await
  }

  /// All positions.
  pub async fn positions(&self) -> Result<Vec<Position>> {
    self.get_json("/api/trading/positions").await
  }

  /// One position by id.
  pub async fn position(&self, id: &str) -> Result<Position> {
    self.get_json(&format!("/api/trading/positions/{id}")).await
  }

  /// Close a position.
  #[instrument(skip(self))]
  pub async fn close_position(&self, id: &str) -> Result<()> {
    self.post_unit::<()>(&format!("/api/trading/positions/{id}/close"), None).await
  }

  /// Move a position's take-profit.
  pub async fn update_take_profit(&self, id: &str, price: f64) -> Result<()> {
    let body = PriceLevel { price };
    self
      .post_unit(&format!("/api/trading/positions/{id}/take-profit"), Some(&body))
      .await
  }

  /// Move a position's stop-loss.
  pub async fn update_stop_loss(&self, id: &str, price: f64) -> Result<()> {
    let body = PriceLevel { price };
    self
      .post_unit(&format!("/api/trading/positions/{id}/stop-loss"), Some(&body))
      .await
  }
}

/// Whether a GET with this status should be retried.
fn is_retryable(status: StatusCode) -> bool {
  RETRY_STATUS_CODES.contains(&status.as_u16())
}

/// Decode a body that is either `T` or `{ "data": T, ... }`.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
  if let Ok(ApiEnvelope {
    data: Some(data), ..
  }) = serde_json::from_str::<ApiEnvelope<T>>(body)
  {
    return Ok(data);
  }
  serde_json::from_str(body).context("Unexpected response shape")
}

/// `message` field of an error body, or the raw body.
fn error_message(body: &str) -> String {
  serde_json::from_str::<serde_json::Value>(body)
    .ok()
    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
    .unwrap_or_else(|| body.to_string())
}
