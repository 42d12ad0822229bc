//! Dashboard REST API Adapter
//!
//! HTTP client for the trading bot backend the price stream belongs to:
//! login/refresh feeding the session store, trading configuration, bot
//! control and positions.
//!
//! Sub-modules:
//! - `client`: HTTP client with bearer auth, retries and 401 handling
//! - `types`: API request/response type definitions

pub mod client;
pub mod types;

pub use client::{DashboardClient, DashboardClientConfig};
