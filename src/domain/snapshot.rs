//! Price snapshot domain type.
//!
//! One immutable BTC price update as pushed by the backend, with the
//! per-exchange breakdown it was aggregated from. Prices are kept as
//! `Decimal` so `65000.12` stays exactly `65000.12`.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Wire shape of a price message: `{price, timestamp, sources}`.
#[derive(Debug, Deserialize)]
struct WirePriceMessage {
    price: serde_json::Number,
    timestamp: serde_json::Number,
    #[serde(default)]
    sources: BTreeMap<String, serde_json::Number>,
}

/// A single price update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceSnapshot {
    /// Aggregated BTC/USD price.
    pub price: Decimal,
    /// Server timestamp (Unix ms).
    pub timestamp_ms: i64,
    /// Price per source exchange, keyed by source name.
    pub sources: BTreeMap<String, Decimal>,
}

impl PriceSnapshot {
    /// Parse a snapshot from a text frame.
    ///
    /// Rejects malformed JSON, non-numeric fields and non-positive prices.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        let wire: WirePriceMessage =
            serde_json::from_str(text).map_err(|e| StreamError::Parse(e.to_string()))?;

        let price = number_to_decimal(&wire.price)?;
        if price <= Decimal::ZERO {
            return Err(StreamError::Parse(format!("price must be positive, got {price}")));
        }

        let timestamp_ms = wire
            .timestamp
            .as_i64()
            .or_else(|| wire.timestamp.as_f64().map(|t| t as i64))
            .ok_or_else(|| StreamError::Parse(format!("invalid timestamp {}", wire.timestamp)))?;

        let sources = wire
            .sources
            .iter()
            .map(|(name, value)| Ok((name.clone(), number_to_decimal(value)?)))
            .collect::<Result<BTreeMap<_, _>, StreamError>>()?;

        Ok(Self {
            price,
            timestamp_ms,
            sources,
        })
    }

    /// Server timestamp as a UTC datetime, if in range.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }

    /// Difference between the highest and lowest source quote.
    pub fn source_spread(&self) -> Option<Decimal> {
        let max = self.sources.values().max()?;
        let min = self.sources.values().min()?;
        Some(*max - *min)
    }
}

/// Convert a JSON number to `Decimal` via its shortest textual form.
fn number_to_decimal(n: &serde_json::Number) -> Result<Decimal, StreamError> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| StreamError::Parse(format!("unrepresentable number {text}: {e}")))
}
