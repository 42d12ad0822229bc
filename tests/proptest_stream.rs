//! Property-based Tests - Backoff and Fan-out Invariants
//!
//! Uses proptest to verify invariants that must hold for all
//! reconnect policies and subscriber mixes.

use std::panic::panic_any;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;

use btc_price_stream::domain::BackoffPolicy;
use btc_price_stream::usecases::subscribers::PriceCallback;
use btc_price_stream::usecases::SubscriberRegistry;

fn policy(max_attempts: u32, initial_ms: u64, max_ms: u64) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(initial_ms),
        max_delay: Duration::from_millis(max_ms),
    }
}

// ---- Backoff Properties ----

proptest! {
    /// Delays never exceed the ceiling and never shrink.
    #[test]
    fn backoff_delays_bounded_and_monotonic(
        initial in 1u64..10_000,
        extra in 0u64..100_000,
        retries in 1u32..40,
    ) {
        let p = policy(5, initial, initial + extra);
        let mut previous = Duration::ZERO;
        for k in 1..=retries {
            let d = p.delay_for_retry(k);
            prop_assert!(d <= p.max_delay);
            prop_assert!(d >= previous);
            previous = d;
        }
    }

    /// Each delay is double the previous one until it hits the ceiling.
    #[test]
    fn backoff_doubles_until_ceiling(
        initial in 1u64..5_000,
        extra in 0u64..60_000,
        k in 1u32..20,
    ) {
        let p = policy(5, initial, initial + extra);
        let d = p.delay_for_retry(k);
        let next = p.delay_for_retry(k + 1);
        prop_assert_eq!(next, (d * 2).min(p.max_delay));
    }

    /// Exactly `max_attempts` attempts are made before giving up.
    #[test]
    fn attempt_budget_matches_max_attempts(max_attempts in 1u32..50) {
        let p = policy(max_attempts, 1_000, 30_000);
        let mut attempts = 1;
        let mut retries = 0;
        while p.allows_retry(retries) {
            retries += 1;
            attempts += 1;
        }
        prop_assert_eq!(attempts, max_attempts);
    }
}

// ---- Fan-out Properties ----

proptest! {
    /// Non-panicking callbacks see every price in registration order,
    /// whatever the other callbacks do.
    #[test]
    fn fan_out_order_survives_panics(
        panics in proptest::collection::vec(any::<bool>(), 1..12),
        cents in 1i64..10_000_000,
    ) {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();

        for (i, &panicky) in panics.iter().enumerate() {
            let log = Arc::clone(&log);
            let cb: PriceCallback = Arc::new(move |price| {
                if panicky {
                    panic_any(i);
                }
                log.lock().unwrap().push((i, price));
            });
            handles.push(registry.register(cb));
        }

        let price = Decimal::new(cents, 2);
        let failures = registry.notify(price);

        let expected: Vec<(usize, Decimal)> = panics
            .iter()
            .enumerate()
            .filter(|(_, p)| !**p)
            .map(|(i, _)| (i, price))
            .collect();
        prop_assert_eq!(failures, panics.iter().filter(|p| **p).count());
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
        prop_assert_eq!(registry.len(), panics.len());
    }
}
