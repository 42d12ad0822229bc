//! Market Data Feed Adapters - Real-time Price Streaming
//!
//! Provides the WebSocket transport behind the BTC price stream
//! (tokio-tungstenite implementation of the transport port).

pub mod price_ws;

pub use price_ws::WsConnector;
