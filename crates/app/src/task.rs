//! Task contract: the three steps every activity variant implements.
//!
//! A task is driven once per cycle: [`Task::check`] gates the cycle without
//! side effects, [`Task::execute`] acts on the device and [`Task::verify`]
//! confirms the effect happened. Steps report problems as [`StepError`]; the
//! runner maps them into the failure taxonomy with [`classify`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use minibot_domain::error::DeviceError;
use minibot_domain::failure::FailureReason;
use minibot_domain::id::ActivityId;
use minibot_domain::time::{self, Timestamp};

use crate::ports::{Clock, DeviceCapability};
use crate::settings::Pacing;

/// One automation task variant, driven by the scheduler.
#[async_trait]
pub trait Task<D: DeviceCapability>: Send + Sync {
    /// Whether the cycle should proceed. `false` skips the cycle without
    /// counting a failure.
    async fn check(&mut self, _ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        Ok(true)
    }

    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError>;

    /// Whether the intended effect is observable. `false` is a failure.
    async fn verify(&mut self, _ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        Ok(true)
    }
}

/// Error returned by a task step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The step could not do its job; retried with backoff.
    #[error("{0}")]
    Failed(String),

    /// Something on screen demands that the whole scheduler stops.
    #[error("critical safety condition: {0}")]
    Critical(String),

    /// The execution budget of the cycle is spent.
    #[error("execution budget exhausted")]
    Timeout,

    /// The step panicked; caught by the runner.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Step of a cycle in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Execute,
    Verify,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Check => "check",
            Self::Execute => "execute",
            Self::Verify => "verify",
        })
    }
}

/// Map a step error into the failure taxonomy.
///
/// | error | check / execute | verify |
/// |---|---|---|
/// | device unreachable | `ResourceUnavailable` | `ResourceUnavailable` |
/// | other device error, `Failed` | `TransientExecutionFailure` | `VerificationUncertain` |
/// | `Timeout` | `Timeout` | `VerificationUncertain` |
/// | `Critical` | `CriticalSafetyCondition` | `CriticalSafetyCondition` |
/// | `Panicked` | `TransientExecutionFailure` | `TransientExecutionFailure` |
#[must_use]
pub fn classify(phase: Phase, error: &StepError) -> FailureReason {
    match (phase, error) {
        (_, StepError::Device(err)) if err.is_unreachable() => FailureReason::ResourceUnavailable,
        (_, StepError::Critical(_)) => FailureReason::CriticalSafetyCondition,
        (_, StepError::Panicked(_)) => FailureReason::TransientExecutionFailure,
        (Phase::Verify, StepError::Device(_) | StepError::Failed(_) | StepError::Timeout) => {
            FailureReason::VerificationUncertain
        }
        (_, StepError::Timeout) => FailureReason::Timeout,
        (_, StepError::Device(_) | StepError::Failed(_)) => FailureReason::TransientExecutionFailure,
    }
}

/// What a step may use while it runs.
pub struct TaskContext<'a, D> {
    device: &'a D,
    clock: &'a dyn Clock,
    activity_id: &'a ActivityId,
    stop: &'a AtomicBool,
    pacing: Pacing,
    deadline: Timestamp,
}

impl<'a, D: DeviceCapability> TaskContext<'a, D> {
    pub(crate) fn new(
        device: &'a D,
        clock: &'a dyn Clock,
        activity_id: &'a ActivityId,
        stop: &'a AtomicBool,
        pacing: Pacing,
        deadline: Timestamp,
    ) -> Self {
        Self {
            device,
            clock,
            activity_id,
            stop,
            pacing,
            deadline,
        }
    }

    #[must_use]
    pub fn device(&self) -> &D {
        self.device
    }

    #[must_use]
    pub fn activity_id(&self) -> &ActivityId {
        self.activity_id
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Budget left before the cycle times out.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        time::elapsed(self.clock.now(), self.deadline)
    }

    /// Whether the host asked the scheduler to stop. Long steps may wind down
    /// early at a safe point; the cycle itself still completes.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Fail with [`StepError::Timeout`] once the execution budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Timeout`] past the deadline.
    pub fn checkpoint(&self) -> Result<(), StepError> {
        if self.clock.now() > self.deadline {
            Err(StepError::Timeout)
        } else {
            Ok(())
        }
    }

    /// Wait for `duration` within the execution budget.
    ///
    /// Returns immediately when a stop was requested.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Timeout`] without waiting when the pause would
    /// outlast the deadline.
    pub async fn pause(&self, duration: Duration) -> Result<(), StepError> {
        self.checkpoint()?;
        if self.stop_requested() || duration.is_zero() {
            return Ok(());
        }
        if time::add(self.clock.now(), duration) > self.deadline {
            return Err(StepError::Timeout);
        }
        self.clock.sleep(duration).await;
        Ok(())
    }

    /// Human-like pause drawn uniformly from the configured pacing bounds.
    ///
    /// # Errors
    ///
    /// Same as [`pause`](Self::pause).
    pub async fn pause_randomized(&self) -> Result<(), StepError> {
        let delay = random_delay(self.pacing);
        self.pause(delay).await
    }
}

fn random_delay(pacing: Pacing) -> Duration {
    let (min, max) = pacing.bounds();
    if min == max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use crate::testing::FakeDevice;
    use chrono::{TimeZone, Utc};

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn should_classify_unreachable_device_as_resource_unavailable() {
        let err = StepError::Device(DeviceError::Unreachable);
        assert_eq!(classify(Phase::Execute, &err), FailureReason::ResourceUnavailable);
        let err = StepError::Device(DeviceError::Capture("usb".to_string()));
        assert_eq!(classify(Phase::Verify, &err), FailureReason::ResourceUnavailable);
    }

    #[test]
    fn should_classify_verify_failures_as_uncertain() {
        for err in [
            StepError::Failed("no".to_string()),
            StepError::Timeout,
            StepError::Device(DeviceError::Vision("bad template".to_string())),
        ] {
            assert_eq!(
                classify(Phase::Verify, &err),
                FailureReason::VerificationUncertain
            );
        }
    }

    #[test]
    fn should_classify_timeout_outside_verify_as_timeout() {
        assert_eq!(classify(Phase::Check, &StepError::Timeout), FailureReason::Timeout);
        assert_eq!(classify(Phase::Execute, &StepError::Timeout), FailureReason::Timeout);
    }

    #[test]
    fn should_classify_critical_and_panic() {
        assert_eq!(
            classify(Phase::Execute, &StepError::Critical("captcha".to_string())),
            FailureReason::CriticalSafetyCondition
        );
        assert_eq!(
            classify(Phase::Check, &StepError::Panicked("oops".to_string())),
            FailureReason::TransientExecutionFailure
        );
    }

    #[tokio::test]
    async fn should_consume_budget_when_pausing() {
        let device = FakeDevice::default();
        let clock = ManualClock::new(start());
        let id: ActivityId = "a".parse().unwrap();
        let stop = AtomicBool::new(false);
        let deadline = start() + chrono::TimeDelta::seconds(10);
        let ctx = TaskContext::new(&device, &clock, &id, &stop, Pacing::none(), deadline);

        ctx.pause(Duration::from_secs(4)).await.unwrap();
        assert_eq!(ctx.remaining(), Duration::from_secs(6));
        assert_eq!(
            ctx.pause(Duration::from_secs(7)).await,
            Err(StepError::Timeout)
        );
        // The refused pause must not move the clock.
        assert_eq!(clock.now(), start() + chrono::TimeDelta::seconds(4));
    }

    #[tokio::test]
    async fn should_skip_pause_when_stop_requested() {
        let device = FakeDevice::default();
        let clock = ManualClock::new(start());
        let id: ActivityId = "a".parse().unwrap();
        let stop = AtomicBool::new(true);
        let ctx = TaskContext::new(
            &device,
            &clock,
            &id,
            &stop,
            Pacing::none(),
            start() + chrono::TimeDelta::seconds(10),
        );

        assert!(ctx.stop_requested());
        ctx.pause(Duration::from_secs(5)).await.unwrap();
        assert_eq!(clock.now(), start());
    }

    #[tokio::test]
    async fn should_pause_within_pacing_bounds() {
        let device = FakeDevice::default();
        let clock = ManualClock::new(start());
        let id: ActivityId = "a".parse().unwrap();
        let stop = AtomicBool::new(false);
        let pacing = Pacing {
            min_action_delay: Duration::from_millis(300),
            max_action_delay: Duration::from_millis(900),
        };
        let ctx = TaskContext::new(
            &device,
            &clock,
            &id,
            &stop,
            pacing,
            start() + chrono::TimeDelta::seconds(60),
        );

        ctx.pause_randomized().await.unwrap();
        let waited = time::elapsed(start(), clock.now());
        assert!(waited >= Duration::from_millis(300));
        assert!(waited <= Duration::from_millis(900));
    }

    #[test]
    fn should_time_out_checkpoint_past_deadline() {
        let device = FakeDevice::default();
        let clock = ManualClock::new(start());
        let id: ActivityId = "a".parse().unwrap();
        let stop = AtomicBool::new(false);
        let ctx = TaskContext::new(&device, &clock, &id, &stop, Pacing::none(), start());
        assert!(ctx.checkpoint().is_ok());
        clock.advance(Duration::from_millis(1));
        assert_eq!(ctx.checkpoint(), Err(StepError::Timeout));
    }
}
