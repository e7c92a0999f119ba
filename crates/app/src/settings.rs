//! Scheduler tuning knobs, filled in by the host from its configuration.

use std::time::Duration;

use minibot_domain::retry::BackoffPolicy;

/// Randomized inter-action delay used by [`crate::task::TaskContext::pause_randomized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_action_delay: Duration,
    pub max_action_delay: Duration,
}

impl Pacing {
    /// No delay at all; tests and dry runs.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            min_action_delay: Duration::ZERO,
            max_action_delay: Duration::ZERO,
        }
    }

    /// Bounds ordered so that `min <= max`.
    #[must_use]
    pub fn bounds(&self) -> (Duration, Duration) {
        if self.min_action_delay <= self.max_action_delay {
            (self.min_action_delay, self.max_action_delay)
        } else {
            (self.max_action_delay, self.min_action_delay)
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_action_delay: Duration::from_millis(300),
            max_action_delay: Duration::from_millis(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Cadence of the spawned loop.
    pub tick_interval: Duration,
    /// Upper bound of the re-poll delay after a skipped cycle.
    pub min_poll_interval: Duration,
    /// How often a paused scheduler asks the device whether it is back.
    pub recovery_probe_interval: Duration,
    pub backoff: BackoffPolicy,
    pub pacing: Pacing,
    /// Seed for backoff jitter; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            min_poll_interval: Duration::from_secs(60),
            recovery_probe_interval: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
            pacing: Pacing::default(),
            rng_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_order_inverted_pacing_bounds() {
        let pacing = Pacing {
            min_action_delay: Duration::from_millis(900),
            max_action_delay: Duration::from_millis(300),
        };
        assert_eq!(
            pacing.bounds(),
            (Duration::from_millis(300), Duration::from_millis(900))
        );
    }

    #[test]
    fn should_default_to_one_second_ticks() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.tick_interval, Duration::from_secs(1));
        assert_eq!(settings.backoff, BackoffPolicy::default());
    }
}
