//! Activity state: the lifecycle state machine of one activity.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Lifecycle state of an activity.
///
/// ```text
/// Idle → Scheduled → CheckingPrerequisites → {Ready | Skipped}
///      Ready → Executing → Verifying → {Succeeded | Failed}
///      Succeeded → Idle
///      Failed → {Retrying | Scheduled | Disabled}
///      Retrying → CheckingPrerequisites
///      Skipped → Scheduled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Idle,
    Scheduled,
    CheckingPrerequisites,
    Ready,
    Skipped,
    Executing,
    Verifying,
    Succeeded,
    Failed,
    Retrying,
    /// Terminal: retry budget exhausted, needs operator intervention.
    Disabled,
}

impl ActivityState {
    /// States the scheduler may pick an activity from.
    #[must_use]
    pub fn is_selectable(self) -> bool {
        matches!(self, Self::Idle | Self::Scheduled | Self::Retrying)
    }

    /// States in which the activity holds the device.
    #[must_use]
    pub fn is_in_cycle(self) -> bool {
        matches!(
            self,
            Self::CheckingPrerequisites | Self::Ready | Self::Executing | Self::Verifying
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ActivityState as S;
        matches!(
            (self, next),
            // Operator disable/enable from any resting state.
            (S::Idle | S::Scheduled | S::Retrying, S::Disabled | S::Idle)
            | (S::Disabled, S::Idle)
            | (S::Idle, S::Scheduled)
            | (S::Idle | S::Scheduled | S::Retrying, S::CheckingPrerequisites)
            | (S::CheckingPrerequisites, S::Ready | S::Skipped | S::Failed)
            | (S::Ready, S::Executing)
            | (S::Executing, S::Verifying | S::Failed)
            | (S::Verifying, S::Succeeded | S::Failed)
            | (S::Succeeded, S::Idle)
            | (S::Failed, S::Retrying | S::Scheduled | S::Disabled)
            | (S::Skipped, S::Scheduled)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the lifecycle forbids the move.
    pub fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::CheckingPrerequisites => "checking_prerequisites",
            Self::Ready => "ready",
            Self::Skipped => "skipped",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::Disabled => "disabled",
        })
    }
}
