//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with port interfaces.
//!
//! Use cases:
//! - `PriceStreamClient`: live price connection with backoff reconnect
//! - `SubscriberRegistry`: ordered price callback fan-out

pub mod price_stream;
pub mod subscribers;

pub use price_stream::{PriceStreamClient, StreamSettings};
pub use subscribers::{SubscriberRegistry, Subscription};
