//! Statistics: per-activity counters and scheduler-wide aggregates.
//!
//! Counters only ever grow (until an explicit reset). They are written from
//! an activity's terminal per-cycle transitions and read through snapshots.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::FailureReason;
use crate::id::ActivityId;
use crate::time::Timestamp;

/// Weight of the latest outcome in the decayed success rate.
const SUCCESS_RATE_DECAY: f64 = 0.2;

/// Counters for one activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStatistics {
    /// Cycles that got past the prerequisite gate (succeeded or failed).
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Cycles that ended because a prerequisite was not met.
    pub skips: u64,
    pub failures_by_reason: BTreeMap<FailureReason, u64>,
    #[serde(with = "optional_millis", default)]
    pub last_duration: Option<Duration>,
    #[serde(with = "millis", default)]
    pub total_duration: Duration,
    /// Exponentially decayed success rate in `[0, 1]`, `None` before the first attempt.
    pub recent_success_rate: Option<f64>,
}

impl ActivityStatistics {
    pub fn record_success(&mut self, duration: Duration) {
        self.attempts += 1;
        self.successes += 1;
        self.record_duration(duration);
        self.decay(1.0);
    }

    pub fn record_failure(&mut self, reason: FailureReason, duration: Duration) {
        self.attempts += 1;
        self.failures += 1;
        *self.failures_by_reason.entry(reason).or_default() += 1;
        self.record_duration(duration);
        self.decay(0.0);
    }

    pub fn record_skip(&mut self) {
        self.skips += 1;
    }

    /// Lifetime success ratio in `[0, 1]`; `0` when nothing was attempted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    /// Mean duration of attempted cycles.
    #[must_use]
    pub fn average_duration(&self) -> Option<Duration> {
        let attempts = u32::try_from(self.attempts).ok().filter(|n| *n > 0)?;
        Some(self.total_duration / attempts)
    }

    fn record_duration(&mut self, duration: Duration) {
        self.last_duration = Some(duration);
        self.total_duration = self.total_duration.saturating_add(duration);
    }

    fn decay(&mut self, sample: f64) {
        self.recent_success_rate = Some(match self.recent_success_rate {
            None => sample,
            Some(rate) => rate + SUCCESS_RATE_DECAY * (sample - rate),
        });
    }
}

/// Scheduler-wide counters, kept even for activities that were unregistered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub skips: u64,
    pub failures_by_reason: BTreeMap<FailureReason, u64>,
}

impl AggregateCounters {
    pub fn record_success(&mut self) {
        self.attempts += 1;
        self.successes += 1;
    }

    pub fn record_failure(&mut self, reason: FailureReason) {
        self.attempts += 1;
        self.failures += 1;
        *self.failures_by_reason.entry(reason).or_default() += 1;
    }

    pub fn record_skip(&mut self) {
        self.skips += 1;
    }
}

/// Per-activity entry of a [`StatisticsSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStatisticsEntry {
    pub id: ActivityId,
    pub name: String,
    pub statistics: ActivityStatistics,
}

/// Read-only view returned to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub started_at: Option<Timestamp>,
    #[serde(with = "millis")]
    pub uptime: Duration,
    pub totals: AggregateCounters,
    pub activities: Vec<ActivityStatisticsEntry>,
}

impl StatisticsSnapshot {
    /// Statistics of one activity.
    #[must_use]
    pub fn activity(&self, id: &ActivityId) -> Option<&ActivityStatistics> {
        self.activities
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| &entry.statistics)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
