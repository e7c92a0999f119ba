//! Status snapshots handed to the host.

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ActivityState};
use crate::failure::FailureRecord;
use crate::id::ActivityId;
use crate::time::Timestamp;

/// Whether the scheduler loop is running and, if so, whether it may select work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    /// Device unreachable; waiting for it to answer again.
    Paused,
    /// Critical safety condition; waiting for an operator.
    Halted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Halted => "halted",
        })
    }
}

/// Per-activity line of a [`SchedulerStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStatus {
    pub id: ActivityId,
    pub name: String,
    pub kind: String,
    pub priority: i32,
    pub enabled: bool,
    pub state: ActivityState,
    pub retry_counter: u32,
    pub next_eligible: Timestamp,
    pub last_execution: Option<Timestamp>,
    /// Start of the last cycle, skipped and failed ones included.
    pub last_attempt: Option<Timestamp>,
    pub last_failure: Option<FailureRecord>,
}

impl From<&Activity> for ActivityStatus {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.definition.id.clone(),
            name: activity.definition.name.clone(),
            kind: activity.definition.kind.clone(),
            priority: activity.definition.priority,
            enabled: activity.definition.enabled,
            state: activity.runtime.state,
            retry_counter: activity.runtime.retry_counter,
            next_eligible: activity.runtime.next_eligible,
            last_execution: activity.runtime.last_execution,
            last_attempt: activity.runtime.last_attempt,
            last_failure: activity.runtime.last_failure.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub run_state: RunState,
    /// Reason of the last halt, kept until an operator resumes.
    pub halted_reason: Option<String>,
    /// Activities in registration order.
    pub activities: Vec<ActivityStatus>,
}

impl SchedulerStatus {
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.run_state == RunState::Halted
    }

    #[must_use]
    pub fn activity(&self, id: &ActivityId) -> Option<&ActivityStatus> {
        self.activities.iter().find(|status| &status.id == id)
    }
}

/// One entry of the upcoming-runs listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingRun {
    pub id: ActivityId,
    pub name: String,
    pub priority: i32,
    /// Earliest instant the activity is eligible, window ignored.
    pub next_eligible: Timestamp,
    /// Earliest local wall-clock time at which it may actually run.
    pub expected_local: chrono::NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityDefinition;

    #[test]
    fn should_build_status_from_activity() {
        let definition = ActivityDefinition::builder()
            .id("daily_login")
            .kind("launch_app")
            .priority(8)
            .build()
            .unwrap();
        let now = crate::time::now();
        let activity = Activity::new(definition, now);
        let status = ActivityStatus::from(&activity);
        assert_eq!(status.id.as_str(), "daily_login");
        assert_eq!(status.priority, 8);
        assert_eq!(status.state, ActivityState::Idle);
        assert_eq!(status.next_eligible, now);
        assert!(status.last_failure.is_none());
    }

    #[test]
    fn should_default_to_stopped() {
        let status = SchedulerStatus::default();
        assert_eq!(status.run_state, RunState::Stopped);
        assert!(!status.is_halted());
        assert_eq!(status.run_state.to_string(), "stopped");
    }
}
