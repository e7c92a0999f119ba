//! Failure taxonomy: the reason codes every failed cycle is mapped into.
//!
//! A prerequisite that is not met is deliberately *not* a failure: it is
//! reported as [`CycleOutcome::Skipped`] and never touches the retry budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Why an activity cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Retryable error while checking or executing; backoff applies.
    TransientExecutionFailure,
    /// The task body ran but its effect could not be confirmed.
    VerificationUncertain,
    /// The device is unreachable; the whole scheduler pauses.
    ResourceUnavailable,
    /// An external safety signal; the whole scheduler halts until resumed.
    CriticalSafetyCondition,
    /// The cycle exceeded the activity's execution budget.
    Timeout,
}

impl FailureReason {
    /// Whether this failure consumes the activity's retry budget.
    ///
    /// Scheduler-wide conditions are not the activity's fault and leave the
    /// retry counter untouched.
    #[must_use]
    pub fn counts_toward_retries(self) -> bool {
        !self.is_scheduler_wide()
    }

    /// Whether this failure affects the scheduler as a whole.
    #[must_use]
    pub fn is_scheduler_wide(self) -> bool {
        matches!(
            self,
            Self::ResourceUnavailable | Self::CriticalSafetyCondition
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TransientExecutionFailure => "transient_execution_failure",
            Self::VerificationUncertain => "verification_uncertain",
            Self::ResourceUnavailable => "resource_unavailable",
            Self::CriticalSafetyCondition => "critical_safety_condition",
            Self::Timeout => "timeout",
        })
    }
}

/// A failure kept for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub reason: FailureReason,
    pub message: String,
    pub at: Timestamp,
}

impl FailureRecord {
    #[must_use]
    pub fn new(reason: FailureReason, message: impl Into<String>, at: Timestamp) -> Self {
        Self {
            reason,
            message: message.into(),
            at,
        }
    }
}

/// How a single check → execute → verify cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Task executed and verified.
    Succeeded,
    /// Prerequisite not met; re-polled after `poll_delay`.
    Skipped { poll_delay_secs: u64 },
    /// Failed and will be retried after the backoff delay.
    Retrying {
        reason: FailureReason,
        attempt: u32,
        delay_secs: u64,
    },
    /// Failed with a scheduler-wide reason; the activity keeps its schedule.
    Deferred { reason: FailureReason },
    /// Retry budget exhausted; the activity is disabled.
    Disabled { reason: FailureReason },
}

impl CycleOutcome {
    pub(crate) fn skipped(poll_delay: Duration) -> Self {
        Self::Skipped {
            poll_delay_secs: poll_delay.as_secs(),
        }
    }

    /// The failure reason, when the cycle failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Succeeded | Self::Skipped { .. } => None,
            Self::Retrying { reason, .. }
            | Self::Deferred { reason }
            | Self::Disabled { reason } => Some(*reason),
        }
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Skipped { poll_delay_secs } => write!(f, "skipped(poll in {poll_delay_secs}s)"),
            Self::Retrying {
                reason,
                attempt,
                delay_secs,
            } => write!(f, "retrying({reason}, attempt {attempt}, in {delay_secs}s)"),
            Self::Deferred { reason } => write!(f, "deferred({reason})"),
            Self::Disabled { reason } => write!(f, "disabled({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_count_activity_level_failures_toward_retries() {
        assert!(FailureReason::TransientExecutionFailure.counts_toward_retries());
        assert!(FailureReason::VerificationUncertain.counts_toward_retries());
        assert!(FailureReason::Timeout.counts_toward_retries());
    }

    #[test]
    fn should_not_count_scheduler_wide_failures_toward_retries() {
        assert!(!FailureReason::ResourceUnavailable.counts_toward_retries());
        assert!(!FailureReason::CriticalSafetyCondition.counts_toward_retries());
    }

    #[test]
    fn should_serialize_reason_as_snake_case() {
        let json = serde_json::to_string(&FailureReason::VerificationUncertain).unwrap();
        assert_eq!(json, "\"verification_uncertain\"");
        assert_eq!(
            FailureReason::VerificationUncertain.to_string(),
            "verification_uncertain"
        );
    }

    #[test]
    fn should_expose_failure_reason_of_outcome() {
        assert_eq!(CycleOutcome::Succeeded.failure_reason(), None);
        assert_eq!(
            CycleOutcome::skipped(Duration::from_secs(60)).failure_reason(),
            None
        );
        let retry = CycleOutcome::Retrying {
            reason: FailureReason::Timeout,
            attempt: 1,
            delay_secs: 60,
        };
        assert_eq!(retry.failure_reason(), Some(FailureReason::Timeout));
    }

    #[test]
    fn should_display_outcomes() {
        assert_eq!(CycleOutcome::Succeeded.to_string(), "succeeded");
        let disabled = CycleOutcome::Disabled {
            reason: FailureReason::TransientExecutionFailure,
        };
        assert_eq!(
            disabled.to_string(),
            "disabled(transient_execution_failure)"
        );
    }
}
