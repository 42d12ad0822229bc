//! BTC Price Stream — Library Root
//!
//! Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod usecases;

pub use error::{StreamError, StreamResult};
pub use usecases::{PriceStreamClient, StreamSettings, Subscription};
