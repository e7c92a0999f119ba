//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `minibot.toml` in the working directory, or the file named by
//! `MINIBOT_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use minibot_adapter_virtual::VirtualDevice;
use minibot_app::settings::{Pacing, SchedulerSettings};
use minibot_domain::activity::{ActivityDefinition, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY, Parameters};
use minibot_domain::error::MiniBotError;
use minibot_domain::retry::BackoffPolicy;
use minibot_domain::vision::Region;
use minibot_domain::window::TimeWindow;

const DEFAULT_PATH: &str = "minibot.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
    pub logging: LoggingConfig,
    /// Initial screen of the virtual device.
    pub device: DeviceConfig,
    pub activities: Vec<ActivityConfig>,
}

/// Loop cadence and recovery timing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// Upper bound of the re-poll delay after an unmet prerequisite.
    pub min_poll_interval_secs: u64,
    pub recovery_probe_interval_secs: u64,
    /// Seed for backoff jitter, for reproducible runs.
    pub rng_seed: Option<u64>,
}

/// Backoff between failed attempts.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub jitter_secs: u64,
}

/// Randomized delay between device actions.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_action_delay_ms: u64,
    pub max_action_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Simulated latency of every capture and input.
    pub latency_ms: u64,
    pub elements: Vec<ElementConfig>,
    pub texts: Vec<TextConfig>,
}

/// A template visible on the virtual screen.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementConfig {
    pub template: String,
    /// `[x, y, width, height]`
    pub region: [u32; 4],
    #[serde(default)]
    pub persistent: bool,
}

/// OCR text of a region, or of the whole virtual screen.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextConfig {
    pub region: Option<[u32; 4]>,
    pub text: String,
}

/// One `[[activities]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    pub id: String,
    pub name: Option<String>,
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Summed with `interval_hours`; both absent means the default interval.
    pub interval_minutes: Option<u64>,
    pub interval_hours: Option<u64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub max_execution_secs: Option<u64>,
    #[serde(default)]
    pub parameters: Parameters,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Config {
    /// Load configuration from `MINIBOT_CONFIG` or `minibot.toml` (if
    /// present) then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("MINIBOT_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MINIBOT_TICK_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.scheduler.tick_interval_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("MINIBOT_RNG_SEED") {
            if let Ok(seed) = val.parse() {
                self.scheduler.rng_seed = Some(seed);
            }
        }
        if let Ok(val) = std::env::var("MINIBOT_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "tick interval must be non-zero".to_string(),
            ));
        }
        if self.scheduler.recovery_probe_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "recovery probe interval must be non-zero".to_string(),
            ));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(ConfigError::Validation(
                "retry max delay must not be below the base delay".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for activity in &self.activities {
            if !seen.insert(activity.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "activity {} is defined twice",
                    activity.id
                )));
            }
            activity.definition()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: Duration::from_millis(self.scheduler.tick_interval_ms),
            min_poll_interval: Duration::from_secs(self.scheduler.min_poll_interval_secs),
            recovery_probe_interval: Duration::from_secs(self.scheduler.recovery_probe_interval_secs),
            backoff: BackoffPolicy {
                base_delay: Duration::from_secs(self.retry.base_delay_secs),
                max_delay: Duration::from_secs(self.retry.max_delay_secs),
                jitter: Duration::from_secs(self.retry.jitter_secs),
            },
            pacing: Pacing {
                min_action_delay: Duration::from_millis(self.pacing.min_action_delay_ms),
                max_action_delay: Duration::from_millis(self.pacing.max_action_delay_ms),
            },
            rng_seed: self.scheduler.rng_seed,
        }
    }

    /// Activity definitions in file order.
    ///
    /// # Errors
    ///
    /// Returns the first definition that fails validation.
    pub fn activity_definitions(&self) -> Result<Vec<ActivityDefinition>, ConfigError> {
        self.activities.iter().map(ActivityConfig::definition).collect()
    }
}

impl ActivityConfig {
    fn interval(&self) -> Result<Option<Duration>, ConfigError> {
        if self.interval_minutes.is_none() && self.interval_hours.is_none() {
            return Ok(None);
        }
        let secs = self
            .interval_hours
            .unwrap_or_default()
            .checked_mul(60)
            .and_then(|minutes| minutes.checked_add(self.interval_minutes.unwrap_or_default()))
            .and_then(|minutes| minutes.checked_mul(60))
            .ok_or_else(|| {
                ConfigError::Validation(format!("activity {}: interval is too large", self.id))
            })?;
        Ok(Some(Duration::from_secs(secs)))
    }

    /// Build the domain definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a malformed id, window,
    /// interval or policy field.
    pub fn definition(&self) -> Result<ActivityDefinition, ConfigError> {
        let interval = self.interval()?;
        self.build_definition(interval).map_err(|err| {
            ConfigError::Validation(format!("activity {}: {}", self.id, describe(&err)))
        })
    }

    fn build_definition(&self, interval: Option<Duration>) -> Result<ActivityDefinition, MiniBotError> {
        let window = TimeWindow::parse(self.start_time.as_deref(), self.end_time.as_deref())?;
        let mut builder = ActivityDefinition::builder()
            .id(self.id.clone())
            .kind(self.kind.clone())
            .enabled(self.enabled)
            .priority(self.priority)
            .window(window)
            .max_retries(self.max_retries)
            .parameters(self.parameters.clone());
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(interval) = interval {
            builder = builder.interval(interval);
        }
        if let Some(secs) = self.max_execution_secs {
            builder = builder.max_execution(Duration::from_secs(secs));
        }
        builder.build()
    }
}

impl DeviceConfig {
    /// A virtual device showing the configured screen.
    #[must_use]
    pub fn build(&self) -> VirtualDevice {
        let device = VirtualDevice::new().with_latency(Duration::from_millis(self.latency_ms));
        for element in &self.elements {
            let region = region(element.region);
            if element.persistent {
                device.show_persistent(&element.template, region);
            } else {
                device.show(&element.template, region);
            }
        }
        for text in &self.texts {
            device.set_text(text.region.map(region), text.text.clone());
        }
        device
    }
}

fn region([x, y, width, height]: [u32; 4]) -> Region {
    Region::new(x, y, width, height)
}

/// Flatten an error and its sources into one line.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            min_poll_interval_secs: 60,
            recovery_probe_interval_secs: 5,
            rng_seed: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 60,
            max_delay_secs: 240,
            jitter_secs: 0,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_action_delay_ms: 300,
            max_action_delay_ms: 900,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "minibotd=info,minibot=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
