//! Retry/backoff policy: maps a retry attempt number to a delay.
//!
//! `delay(attempt) = min(base * 2^(attempt - 1), max)`, attempts numbered
//! from 1. With the defaults (base 60s, cap 240s) three consecutive failures
//! wait 60s, 120s and 240s.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap and optional symmetric jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(with = "crate::time::duration_secs")]
    pub base_delay: Duration,
    #[serde(with = "crate::time::duration_secs")]
    pub max_delay: Duration,
    /// Maximum absolute deviation added to or removed from each delay.
    #[serde(with = "crate::time::duration_secs", default)]
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(240),
            jitter: Duration::ZERO,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay before retry `attempt` (numbered from 1).
    ///
    /// Attempt `0` is treated as attempt `1`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// [`delay`](Self::delay) shifted by a uniform offset in `[-jitter, +jitter]`,
    /// floored at zero.
    #[must_use]
    pub fn delay_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        let spread = self.jitter.as_millis().min(u128::from(u64::MAX));
        let spread = u64::try_from(spread).unwrap_or(u64::MAX);
        let offset = rng.gen_range(0..=spread.saturating_mul(2));
        let shifted = delay.saturating_add(Duration::from_millis(offset));
        shifted.saturating_sub(Duration::from_millis(spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy(base: u64, max: u64) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(base),
            max_delay: Duration::from_secs(max),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn should_double_delay_for_each_attempt() {
        let p = policy(1, 100);
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(2), Duration::from_secs(2));
        assert_eq!(p.delay(3), Duration::from_secs(4));
        assert_eq!(p.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn should_cap_delay_at_max() {
        let p = policy(1, 4);
        assert_eq!(p.delay(3), Duration::from_secs(4));
        assert_eq!(p.delay(4), Duration::from_secs(4));
        assert_eq!(p.delay(40), Duration::from_secs(4));
    }

    #[test]
    fn should_treat_attempt_zero_as_first_attempt() {
        assert_eq!(policy(3, 100).delay(0), Duration::from_secs(3));
    }

    #[test]
    fn should_default_to_one_two_four_minutes() {
        let p = BackoffPolicy::default();
        assert_eq!(p.delay(1), Duration::from_secs(60));
        assert_eq!(p.delay(2), Duration::from_secs(120));
        assert_eq!(p.delay(3), Duration::from_secs(240));
    }

    #[test]
    fn should_not_jitter_when_jitter_is_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = policy(10, 100);
        assert_eq!(p.delay_with_jitter(2, &mut rng), Duration::from_secs(20));
    }

    #[test]
    fn should_keep_jittered_delay_within_symmetric_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let p = BackoffPolicy {
            jitter: Duration::from_secs(5),
            ..policy(10, 100)
        };
        for _ in 0..200 {
            let d = p.delay_with_jitter(1, &mut rng);
            assert!(d >= Duration::from_secs(5), "{d:?} below lower bound");
            assert!(d <= Duration::from_secs(15), "{d:?} above upper bound");
        }
    }

    #[test]
    fn should_never_jitter_below_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = BackoffPolicy {
            jitter: Duration::from_secs(30),
            ..policy(1, 100)
        };
        for _ in 0..200 {
            // Duration cannot be negative; the floor must hold without panicking.
            let d = p.delay_with_jitter(1, &mut rng);
            assert!(d <= Duration::from_secs(31));
        }
    }
}
