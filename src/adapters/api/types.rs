//! Dashboard API Types - Request/Response Definitions
//!
//! Serde types for the trading bot backend's REST API. Response fields
//! the backend may omit are `Option`.

use serde::{Deserialize, Serialize};

/// Registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: u64,
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Creation time (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update time (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    /// Keep only a user with the required identity fields set.
    pub fn sanitized(self) -> Option<Self> {
        if self.id == 0 || self.username.trim().is_empty() || self.email.trim().is_empty() {
            return None;
        }
        Some(self)
    }
}

/// `POST /api/auth/register` body.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    /// Desired login name.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Plaintext password (TLS only).
    pub password: String,
}

/// `POST /api/auth/login` body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Plaintext password (TLS only).
    pub password: String,
}

/// Login / refresh response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    /// Access token.
    pub token: Option<String>,
    /// Refresh token.
    pub refresh_token: Option<String>,
    /// Logged-in user.
    pub user: Option<User>,
}

/// `POST /auth/refresh` body.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    /// Refresh token from the last login.
    pub refresh_token: String,
}

/// Stored LN Markets exchange credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LnMarketsConfig {
    /// Row id.
    pub id: Option<u64>,
    /// Owner.
    pub user_id: Option<u64>,
    /// API key (the backend may mask it).
    pub api_key: Option<String>,
    /// Whether the testnet exchange is used.
    pub is_testnet: Option<bool>,
    /// Creation time.
    pub created_at: Option<String>,
    /// Last update time.
    pub updated_at: Option<String>,
}

/// `POST /api/lnmarkets/config` body.
#[derive(Clone, Serialize)]
pub struct LnMarketsConfigRequest {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub secret_key: String,
    /// API passphrase.
    pub passphrase: String,
    /// Use the testnet exchange.
    pub is_testnet: bool,
}

impl std::fmt::Debug for LnMarketsConfigRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LnMarketsConfigRequest")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("is_testnet", &self.is_testnet)
            .finish()
    }
}

/// Margin protection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginProtection {
    /// Whether the protection is active.
    pub is_enabled: bool,
    /// Distance to liquidation (%) that triggers a margin top-up.
    pub activation_distance: f64,
    /// Liquidation distance (%) to restore after a top-up.
    pub new_liquidation_distance: f64,
}

/// Daily take-profit settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeProfit {
    /// Whether the take-profit is active.
    pub is_enabled: bool,
    /// Daily target (%).
    pub daily_percentage: f64,
    /// Last time the backend adjusted positions.
    #[serde(default, skip_serializing)]
    pub last_update: Option<String>,
}

/// Grid entry automation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryAutomation {
    /// Whether automated entries are active.
    pub is_enabled: bool,
    /// Quantity (USD) per order.
    pub amount_per_order: f64,
    /// Margin (sats) per order.
    pub margin_per_order: f64,
    /// Orders in the grid.
    pub number_of_orders: u32,
    /// Price step between orders (%).
    pub price_variation: f64,
    /// Price of the first order.
    pub initial_price: f64,
    /// Take-profit per order (%).
    pub take_profit_per_order: f64,
    /// "buy" or "sell".
    pub operation_type: String,
    /// Leverage per order.
    pub leverage: f64,
    /// Grid slots already filled (read-only).
    #[serde(default, skip_serializing)]
    pub filled_slots: Option<u32>,
}

/// Price alert band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    /// Whether alerts are active.
    pub is_enabled: bool,
    /// Lower bound (USD).
    pub min_price: f64,
    /// Upper bound (USD).
    pub max_price: f64,
    /// Check interval (seconds).
    pub check_interval: u64,
    /// Last time an alert fired.
    #[serde(default, skip_serializing)]
    pub last_alert: Option<String>,
}

/// Trading bot process status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotStatus {
    /// Whether the bot loop runs.
    pub is_running: Option<bool>,
    /// Backend status label.
    pub status: Option<String>,
    /// Last activity time.
    pub last_activity: Option<String>,
    /// Last error, if any.
    pub error_message: Option<String>,
}

/// Exchange account balance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountBalance {
    /// Total balance.
    pub balance: Option<f64>,
    /// Balance currency.
    pub currency: Option<String>,
    /// Free balance.
    pub available_balance: Option<f64>,
    /// Balance locked as margin.
    pub margin_balance: Option<f64>,
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Long BTC.
    Long,
    /// Short BTC.
    Short,
}

/// Open or closed margin position.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Position {
    /// Exchange position id.
    pub id: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Direction.
    pub side: Option<PositionSide>,
    /// Size.
    pub size: Option<f64>,
    /// Entry price.
    pub entry_price: Option<f64>,
    /// Mark price.
    pub current_price: Option<f64>,
    /// Unrealized PnL.
    pub unrealized_pnl: Option<f64>,
    /// Realized PnL.
    pub realized_pnl: Option<f64>,
    /// Margin.
    pub margin: Option<f64>,
    /// Liquidation price.
    pub liquidation_price: Option<f64>,
    /// Take-profit price.
    pub take_profit: Option<f64>,
    /// Stop-loss price.
    pub stop_loss: Option<f64>,
}

/// Body for take-profit / stop-loss updates on a position.
#[derive(Debug, Clone, Serialize)]
pub struct PriceLevel {
    /// New trigger price.
    pub price: f64,
}

/// Generic `{data, message, success}` envelope some endpoints use.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Payload.
    pub data: Option<T>,
    /// Human-readable message.
    pub message: Option<String>,
    /// Success flag.
    pub success: Option<bool>,
}
