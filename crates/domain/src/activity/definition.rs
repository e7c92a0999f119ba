//! Activity definition: the externally supplied policy of one activity.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MiniBotError, ValidationError};
use crate::id::ActivityId;
use crate::window::TimeWindow;

/// Activity-specific configuration, interpreted only by the task variant.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_PRIORITY: i32 = 5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_EXECUTION: Duration = Duration::from_secs(5 * 60);

/// What to run, and when it may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub id: ActivityId,
    pub name: String,
    /// Tag selecting the task variant in the task registry.
    pub kind: String,
    /// Higher runs first.
    pub priority: i32,
    /// Minimum duration between two successful runs.
    #[serde(rename = "interval_secs", with = "crate::time::duration_secs")]
    pub interval: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    pub enabled: bool,
    pub max_retries: u32,
    #[serde(rename = "max_execution_secs", with = "crate::time::duration_secs")]
    pub max_execution: Duration,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ActivityDefinition {
    /// Create a builder for constructing an [`ActivityDefinition`].
    #[must_use]
    pub fn builder() -> ActivityDefinitionBuilder {
        ActivityDefinitionBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `kind` is empty ([`ValidationError::EmptyKind`])
    /// - `interval` is zero ([`ValidationError::ZeroInterval`])
    /// - `max_execution` is zero ([`ValidationError::ZeroExecutionBudget`])
    pub fn validate(&self) -> Result<(), MiniBotError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.kind.trim().is_empty() {
            return Err(ValidationError::EmptyKind.into());
        }
        if self.interval.is_zero() {
            return Err(ValidationError::ZeroInterval.into());
        }
        if self.max_execution.is_zero() {
            return Err(ValidationError::ZeroExecutionBudget.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`ActivityDefinition`].
#[derive(Debug, Default)]
pub struct ActivityDefinitionBuilder {
    id: Option<String>,
    name: Option<String>,
    kind: Option<String>,
    priority: Option<i32>,
    interval: Option<Duration>,
    window: Option<TimeWindow>,
    enabled: Option<bool>,
    max_retries: Option<u32>,
    max_execution: Option<Duration>,
    parameters: Parameters,
}

impl ActivityDefinitionBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn max_execution(mut self, max_execution: Duration) -> Self {
        self.max_execution = Some(max_execution);
        self
    }

    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Consume the builder, validate, and return an [`ActivityDefinition`].
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::Validation`] if the id is malformed or any
    /// invariant checked by [`ActivityDefinition::validate`] fails.
    pub fn build(self) -> Result<ActivityDefinition, MiniBotError> {
        let id: ActivityId = self.id.unwrap_or_default().parse()?;
        let definition = ActivityDefinition {
            name: self.name.unwrap_or_else(|| id.to_string()),
            id,
            kind: self.kind.unwrap_or_default(),
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL),
            window: self.window.filter(|w| !w.is_unbounded()),
            enabled: self.enabled.unwrap_or(true),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_execution: self.max_execution.unwrap_or(DEFAULT_MAX_EXECUTION),
            parameters: self.parameters,
        };
        definition.validate()?;
        Ok(definition)
    }
}
