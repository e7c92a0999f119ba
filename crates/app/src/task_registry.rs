//! Task registry: builds task variants from an activity's `kind` tag and
//! parameter map.
//!
//! Each variant declares its parameters as a serde struct with explicit
//! defaults, so a bad parameter map is rejected when the activity is
//! registered rather than when it first runs.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use minibot_domain::activity::Parameters;
use minibot_domain::error::ValidationError;

use crate::ports::DeviceCapability;
use crate::task::Task;
use crate::tasks;

/// A task variant constructible from its declared parameters.
pub trait TaskKind: Sized {
    /// Tag used in activity definitions.
    const KIND: &'static str;

    /// Parameter schema, usually `#[serde(default, deny_unknown_fields)]`.
    type Params: DeserializeOwned;

    /// Build the task, rejecting parameters that parse but make no sense.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason.
    fn from_params(params: Self::Params) -> Result<Self, String>;
}

type Factory<D> =
    Box<dyn Fn(&Parameters) -> Result<Box<dyn Task<D>>, ValidationError> + Send + Sync>;

/// Maps `kind` tags to task factories.
pub struct TaskRegistry<D> {
    factories: BTreeMap<&'static str, Factory<D>>,
}

impl<D> Default for TaskRegistry<D> {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }
}

impl<D: DeviceCapability + 'static> TaskRegistry<D> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in variant.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<tasks::TapTemplate>();
        registry.register::<tasks::LaunchApp>();
        registry.register::<tasks::ReadCounter>();
        registry.register::<tasks::ClearBadges>();
        registry.register::<tasks::SafetyWatch>();
        registry
    }

    /// Register a variant under its [`TaskKind::KIND`] tag.
    pub fn register<T>(&mut self)
    where
        T: TaskKind + Task<D> + 'static,
    {
        self.register_fn(T::KIND, |parameters| {
            let params: T::Params =
                serde_json::from_value(serde_json::Value::Object(parameters.clone())).map_err(
                    |err| ValidationError::InvalidParameters {
                        kind: T::KIND.to_string(),
                        reason: err.to_string(),
                    },
                )?;
            let task = T::from_params(params).map_err(|reason| {
                ValidationError::InvalidParameters {
                    kind: T::KIND.to_string(),
                    reason,
                }
            })?;
            Ok(Box::new(task) as Box<dyn Task<D>>)
        });
    }

    /// Register a custom factory under `kind`, replacing any previous one.
    pub fn register_fn<F>(&mut self, kind: &'static str, factory: F)
    where
        F: Fn(&Parameters) -> Result<Box<dyn Task<D>>, ValidationError> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    /// Build the task for `kind` from `parameters`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownTaskKind`] when nothing is registered
    /// under `kind`, or [`ValidationError::InvalidParameters`] when the
    /// variant rejects the parameters.
    pub fn build(&self, kind: &str, parameters: &Parameters) -> Result<Box<dyn Task<D>>, ValidationError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ValidationError::UnknownTaskKind(kind.to_string()))?;
        factory(parameters)
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered tags, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}
