//! Scheduler event: an immutable record of something that happened.
//!
//! Events are produced when an activity changes state, when a cycle ends and
//! when the scheduler itself starts, stops, pauses, resumes or halts. Hosts
//! subscribe to them to drive a UI or a log.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityState;
use crate::failure::CycleOutcome;
use crate::id::{ActivityId, RunId};
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    ActivityRegistered {
        activity_id: ActivityId,
        at: Timestamp,
    },
    ActivityUnregistered {
        activity_id: ActivityId,
        at: Timestamp,
    },
    StateChanged {
        activity_id: ActivityId,
        from: ActivityState,
        to: ActivityState,
        at: Timestamp,
    },
    CycleCompleted {
        activity_id: ActivityId,
        run_id: RunId,
        outcome: CycleOutcome,
        duration_ms: u64,
        at: Timestamp,
    },
    Started {
        at: Timestamp,
    },
    Stopped {
        at: Timestamp,
    },
    /// The device became unreachable; no activity runs until it answers again.
    Paused {
        message: String,
        at: Timestamp,
    },
    Resumed {
        at: Timestamp,
    },
    /// A critical safety condition was raised; an operator must resume.
    Halted {
        activity_id: ActivityId,
        message: String,
        at: Timestamp,
    },
}

impl SchedulerEvent {
    /// When the event happened.
    #[must_use]
    pub fn at(&self) -> Timestamp {
        match self {
            Self::ActivityRegistered { at, .. }
            | Self::ActivityUnregistered { at, .. }
            | Self::StateChanged { at, .. }
            | Self::CycleCompleted { at, .. }
            | Self::Started { at }
            | Self::Stopped { at }
            | Self::Paused { at, .. }
            | Self::Resumed { at }
            | Self::Halted { at, .. } => *at,
        }
    }

    /// The activity the event is about, if any.
    #[must_use]
    pub fn activity_id(&self) -> Option<&ActivityId> {
        match self {
            Self::ActivityRegistered { activity_id, .. }
            | Self::ActivityUnregistered { activity_id, .. }
            | Self::StateChanged { activity_id, .. }
            | Self::CycleCompleted { activity_id, .. }
            | Self::Halted { activity_id, .. } => Some(activity_id),
            Self::Started { .. }
            | Self::Stopped { .. }
            | Self::Paused { .. }
            | Self::Resumed { .. } => None,
        }
    }
}
