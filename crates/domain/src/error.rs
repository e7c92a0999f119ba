//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`MiniBotError`] via `#[from]`.

use crate::activity::ActivityState;

/// Top-level error returned by domain and application operations.
#[derive(Debug, thiserror::Error)]
pub enum MiniBotError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("conflict")]
    Conflict(#[from] ConflictError),

    #[error("invalid state transition")]
    InvalidTransition(#[from] TransitionError),

    #[error("device error")]
    Device(#[from] DeviceError),

    /// The scheduler loop is no longer running (stopped or crashed).
    #[error("scheduler is not running")]
    SchedulerUnavailable,
}

/// A domain invariant was violated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("id must not be empty")]
    EmptyId,

    #[error("id {0:?} must only contain lowercase ascii letters, digits, `_` or `-`")]
    MalformedId(String),

    #[error("name must not be empty")]
    EmptyName,

    #[error("task kind must not be empty")]
    EmptyKind,

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("max execution duration must be greater than zero")]
    ZeroExecutionBudget,

    #[error("invalid time of day {0:?}, expected HH:MM")]
    MalformedTimeOfDay(String),

    #[error("unknown task kind {0:?}")]
    UnknownTaskKind(String),

    #[error("invalid parameters for task kind {kind:?}: {reason}")]
    InvalidParameters { kind: String, reason: String },

    #[error("activity {0} is disabled")]
    ActivityDisabled(String),
}

/// Requested resource does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A resource with the same identity already exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} already exists")]
pub struct ConflictError {
    pub entity: &'static str,
    pub id: String,
}

/// The activity lifecycle does not allow moving between these two states.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub from: ActivityState,
    pub to: ActivityState,
}

/// Failure reported by the device/vision capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The screen could not be captured; the device is assumed unreachable.
    #[error("frame capture failed: {0}")]
    Capture(String),

    /// An input action (tap, swipe, text, launch) was rejected or timed out.
    #[error("device action `{action}` failed: {reason}")]
    Action {
        action: &'static str,
        reason: String,
    },

    /// Image analysis failed (missing template, bad region, ...).
    #[error("vision error: {0}")]
    Vision(String),

    /// The device does not answer at all.
    #[error("device unreachable")]
    Unreachable,
}

impl DeviceError {
    /// Whether this error means no activity can make progress on the device.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Capture(_) | Self::Unreachable)
    }
}
