//! Retry policy shared by every dispatched request.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay (before jitter).
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the backoff, in `[0, 1]`.
    pub jitter: f64,
    /// No retry is started once this much time has passed since the first attempt.
    pub max_elapsed_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: 0.25,
            max_elapsed_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }

    /// Exponential backoff without jitter for the given retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Backoff for the given retry (1-based) with random jitter applied.
    pub fn delay_for<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let backoff = self.backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return backoff;
        }
        backoff.mul_f64(1.0 + rng.gen_range(0.0..=jitter))
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("retry.jitter must be within [0, 1]".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            max_delay_ms: 500,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay_ms: 1_000,
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let delay = policy.delay_for(1, &mut rng);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_500));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(policy.delay_for(2, &mut rng), policy.backoff(2));
    }

    #[test]
    fn rejects_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }
}
