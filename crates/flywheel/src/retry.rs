//! Backoff policy boundary.
//!
//! Retry delays come from an opaque policy object implementing the
//! [`Backoff`] trait; a fresh instance is produced for every run, so policies
//! never need resetting across runs.

use std::sync::Arc;
use std::time::Duration;

pub use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Factory producing a fresh backoff policy for each run.
pub type BackoffFactory = Arc<dyn Fn() -> Box<dyn Backoff + Send> + Send + Sync>;

/// The policy used when none is configured: exponential delays starting at
/// one second, capped at sixty, never giving up.
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(60),
        max_elapsed_time: None,
        ..Default::default()
    }
}

pub(crate) fn default_backoff_factory() -> BackoffFactory {
    Arc::new(|| Box::new(default_backoff()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_never_exhausts() {
        let mut policy = default_backoff();
        for _ in 0..100 {
            assert!(policy.next_backoff().is_some());
        }
    }

    #[test]
    fn test_default_policy_delays_are_capped() {
        let mut policy = default_backoff();
        // With a 0.5 randomization factor the delay never exceeds 1.5x the
        // 60-second interval cap.
        for _ in 0..50 {
            let delay = policy.next_backoff().expect("never exhausts");
            assert!(delay <= Duration::from_secs(90));
        }
    }
}
