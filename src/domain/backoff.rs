//! Exponential reconnect backoff.
//!
//! Pure policy: given how many retries have already been scheduled since
//! the last successful open, decide whether another one is allowed and
//! how long to wait before it.

use std::time::Duration;

/// Reconnect policy for the price stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total connection attempts (first try included) before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; also the value restored on open.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Whether another retry is allowed after `retries` have been used.
    ///
    /// `retries + 1` attempts have failed at this point (the initial
    /// attempt plus every retry).
    pub const fn allows_retry(&self, retries: u32) -> bool {
        retries.saturating_add(1) < self.max_attempts
    }

    /// Delay to use after `current`, doubled and clamped to the ceiling.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }

    /// Delay before retry `k` (1-based) when starting from the floor.
    pub fn delay_for_retry(&self, k: u32) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..k {
            delay = self.next_delay(delay);
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=4).map(|k| policy.delay_for_retry(k).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_retry_budget_allows_four_retries() {
        let policy = BackoffPolicy::default();
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
        assert!(!policy.allows_retry(u32::MAX));
    }

    #[test]
    fn test_delay_clamped_to_ceiling() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_retry(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for_retry(40), Duration::from_secs(30));
        assert_eq!(policy.next_delay(Duration::from_secs(20)), Duration::from_secs(30));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = BackoffPolicy {
            max_attempts: 1,
            ..BackoffPolicy::default()
        };
        assert!(!policy.allows_retry(0));
    }
}
