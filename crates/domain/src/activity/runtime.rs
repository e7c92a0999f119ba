//! Activity runtime: the mutable scheduling fields rebuilt on every registration.

use serde::{Deserialize, Serialize};

use super::ActivityState;
use crate::failure::FailureRecord;
use crate::time::Timestamp;

/// Runtime bookkeeping of one activity. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRuntime {
    pub state: ActivityState,
    /// Consecutive failures since the last success; reset to 0 on success.
    pub retry_counter: u32,
    /// Last *successful* execution.
    pub last_execution: Option<Timestamp>,
    /// Start of the last cycle, whatever its outcome.
    pub last_attempt: Option<Timestamp>,
    pub next_eligible: Timestamp,
    pub last_failure: Option<FailureRecord>,
}

impl ActivityRuntime {
    /// Fresh runtime, eligible at `now`.
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            state: ActivityState::Idle,
            retry_counter: 0,
            last_execution: None,
            last_attempt: None,
            next_eligible: now,
            last_failure: None,
        }
    }

    /// Move to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TransitionError`] when the lifecycle forbids the move.
    pub(crate) fn move_to(
        &mut self,
        next: ActivityState,
    ) -> Result<ActivityState, crate::error::TransitionError> {
        let previous = self.state;
        self.state = previous.transition(next)?;
        Ok(previous)
    }

    /// Push `next_eligible` forward, never before the last successful execution.
    pub(crate) fn reschedule(&mut self, at: Timestamp) {
        self.next_eligible = match self.last_execution {
            Some(last) if at < last => last,
            _ => at,
        };
    }
}
