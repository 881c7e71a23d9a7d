//! Reconnect delay policies.

use std::fmt::Debug;
use std::time::Duration;

/// Decides how long a session waits before reconnecting.
///
/// `attempt` is the number of consecutive failures, starting at 1. It resets
/// once a handshake is accepted.
pub trait Backoff: Debug + Send + Sync + 'static {
    fn delay(&self, attempt: u32) -> Duration;
}

/// The same delay after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff(pub Duration);

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self(Duration::from_secs(2))
    }
}

impl Backoff for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Doubling delay, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_constant_backoff_default() {
        let policy = ConstantBackoff::default();
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(1000), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff_doubles_then_caps() {
        let policy = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
        assert_eq!(policy.delay(6), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn prop_exponential_monotonic(attempt in 1u32..200) {
            let policy = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(300));
            prop_assert!(policy.delay(attempt) <= policy.delay(attempt + 1));
            prop_assert!(policy.delay(attempt) <= Duration::from_secs(300));
        }
    }
}
