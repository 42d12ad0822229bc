//! Subscriber Registry - Ordered Price Callback Fan-out
//!
//! Callbacks are invoked synchronously in registration order. Each
//! registration returns a `Subscription` that removes exactly that
//! callback when dropped or explicitly unsubscribed.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use rust_decimal::Decimal;
use tracing::error;

/// A registered price callback.
pub type PriceCallback = Arc<dyn Fn(Decimal) + Send + Sync>;

/// Ordered set of price callbacks.
#[derive(Default)]
pub struct SubscriberRegistry {
    /// Monotonic id; BTreeMap order == registration order.
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<u64, PriceCallback>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn callbacks(&self) -> MutexGuard<'_, BTreeMap<u64, PriceCallback>> {
        self.callbacks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a callback and return its handle.
    pub fn register(self: &Arc<Self>, callback: PriceCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks().insert(id, callback);
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Deliver a price to every callback, in registration order.
    ///
    /// The callback list is copied out first so a callback may register
    /// or unsubscribe without deadlocking. Panics are caught and logged.
    /// Returns how many callbacks panicked.
    pub fn notify(&self, price: Decimal) -> usize {
        let callbacks: Vec<(u64, PriceCallback)> = self
            .callbacks()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        let mut failures = 0;
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(price))).is_err() {
                failures += 1;
                error!(subscriber = id, %price, "Price subscriber panicked");
            }
        }
        failures
    }

    /// Remove every callback. Outstanding handles become inert.
    pub fn clear(&self) {
        self.callbacks().clear();
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.callbacks().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks().is_empty()
    }

    fn remove(&self, id: u64) {
        self.callbacks().remove(&id);
    }
}

/// Handle for one registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the callback"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the callback registered for the registry's lifetime.
    ///
    /// It is still removed by `disconnect()`.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn recorder(log: &Arc<Mutex<Vec<(usize, Decimal)>>>, tag: usize) -> PriceCallback {
        let log = Arc::clone(log);
        Arc::new(move |p| log.lock().unwrap().push((tag, p)))
    }

    #[test]
    fn test_notify_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.register(recorder(&log, 1));
        let _b = registry.register(recorder(&log, 2));
        let _c = registry.register(recorder(&log, 3));

        registry.notify(dec!(100));

        assert_eq!(
            *log.lock().unwrap(),
            vec![(1, dec!(100)), (2, dec!(100)), (3, dec!(100))]
        );
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.register(recorder(&log, 1));
        let _boom = registry.register(Arc::new(|_| panic!("subscriber bug")));
        let _c = registry.register(recorder(&log, 3));

        let failures = registry.notify(dec!(7));

        assert_eq!(failures, 1);
        assert_eq!(*log.lock().unwrap(), vec![(1, dec!(7)), (3, dec!(7))]);
    }

    #[test]
    fn test_drop_unsubscribes_only_that_registration() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = registry.register(recorder(&log, 1));
        let _b = registry.register(recorder(&log, 2));

        a.unsubscribe();
        registry.notify(dec!(5));

        assert_eq!(registry.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec![(2, dec!(5))]);
    }

    #[test]
    fn test_same_closure_registered_twice_is_two_registrations() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(&log, 9);
        let first = registry.register(Arc::clone(&cb));
        let _second = registry.register(cb);

        drop(first);
        registry.notify(dec!(1));

        assert_eq!(*log.lock().unwrap(), vec![(9, dec!(1))]);
    }

    #[test]
    fn test_clear_makes_handles_inert() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = registry.register(recorder(&log, 1));
        registry.clear();
        let _b = registry.register(recorder(&log, 2));

        drop(a);
        registry.notify(dec!(3));

        assert_eq!(*log.lock().unwrap(), vec![(2, dec!(3))]);
    }

    #[test]
    fn test_detach_keeps_callback() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(recorder(&log, 1)).detach();

        registry.notify(dec!(2));

        assert_eq!(registry.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec![(1, dec!(2))]);
    }
}
