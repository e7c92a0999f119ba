//! Activity: one automation task definition plus its runtime state.
//!
//! The [`Activity`] aggregate owns the lifecycle bookkeeping: every terminal
//! per-cycle transition goes through one of the `complete_*` methods, which
//! update the runtime fields, the statistics and the state together so the
//! invariants below can never be observed half-applied.
//!
//! - `next_eligible >= last_execution`
//! - `retry_counter <= max_retries`
//! - a disabled activity (`enabled == false`) is never due

mod definition;
mod runtime;
mod state;

use std::time::Duration;

use chrono::NaiveTime;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use definition::{
    ActivityDefinition, ActivityDefinitionBuilder, DEFAULT_INTERVAL, DEFAULT_MAX_EXECUTION,
    DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY, Parameters,
};
pub use runtime::ActivityRuntime;
pub use state::ActivityState;

use crate::error::TransitionError;
use crate::failure::{CycleOutcome, FailureRecord};
use crate::id::ActivityId;
use crate::retry::BackoffPolicy;
use crate::statistics::ActivityStatistics;
use crate::time::{self, Timestamp};

/// A registered activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub definition: ActivityDefinition,
    pub runtime: ActivityRuntime,
    pub statistics: ActivityStatistics,
}

impl Activity {
    /// Build a freshly registered activity, eligible at `now`.
    #[must_use]
    pub fn new(definition: ActivityDefinition, now: Timestamp) -> Self {
        Self {
            definition,
            runtime: ActivityRuntime::new(now),
            statistics: ActivityStatistics::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ActivityId {
        &self.definition.id
    }

    #[must_use]
    pub fn state(&self) -> ActivityState {
        self.runtime.state
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.definition.enabled
    }

    /// Whether the local time of day falls inside the activity's window.
    #[must_use]
    pub fn in_window(&self, local_time: NaiveTime) -> bool {
        self.definition
            .window
            .is_none_or(|window| window.contains(local_time))
    }

    /// Whether the activity belongs to the due set at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp, local_time: NaiveTime) -> bool {
        self.definition.enabled
            && self.runtime.state.is_selectable()
            && self.runtime.next_eligible <= now
            && self.in_window(local_time)
    }

    /// Latest instant the cycle started at `started` may still make progress.
    #[must_use]
    pub fn deadline(&self, started: Timestamp) -> Timestamp {
        time::add(started, self.definition.max_execution)
    }

    /// Normalize a resting state into `Scheduled`.
    ///
    /// Returns the previous state when something changed.
    pub fn normalize(&mut self) -> Option<ActivityState> {
        let target = match self.runtime.state {
            ActivityState::Idle if self.definition.enabled => ActivityState::Scheduled,
            ActivityState::Skipped => ActivityState::Scheduled,
            ActivityState::Succeeded => ActivityState::Idle,
            _ => return None,
        };
        self.runtime.move_to(target).ok()
    }

    /// Enter `CheckingPrerequisites` at the start of a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the activity is not in a selectable state.
    pub fn begin_cycle(&mut self, now: Timestamp) -> Result<ActivityState, TransitionError> {
        let previous = self.runtime.move_to(ActivityState::CheckingPrerequisites)?;
        self.runtime.last_attempt = Some(now);
        Ok(previous)
    }

    /// Advance inside a running cycle (`Ready`, `Executing`, `Verifying`).
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the lifecycle forbids the move.
    pub fn advance(&mut self, next: ActivityState) -> Result<ActivityState, TransitionError> {
        self.runtime.move_to(next)
    }

    /// The prerequisite was not met: skip and re-poll after
    /// `min(interval, min_poll_interval)`.
    ///
    /// Neither the retry counter nor failure statistics change.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the activity is checking prerequisites.
    pub fn complete_skip(
        &mut self,
        now: Timestamp,
        min_poll_interval: Duration,
    ) -> Result<CycleOutcome, TransitionError> {
        self.runtime.move_to(ActivityState::Skipped)?;
        let poll_delay = self.definition.interval.min(min_poll_interval);
        self.runtime.reschedule(time::add(now, poll_delay));
        self.statistics.record_skip();
        Ok(CycleOutcome::skipped(poll_delay))
    }

    /// Execution verified: reset retries and wait a full interval.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the activity is verifying.
    pub fn complete_success(
        &mut self,
        now: Timestamp,
        duration: Duration,
    ) -> Result<CycleOutcome, TransitionError> {
        self.runtime.move_to(ActivityState::Succeeded)?;
        self.runtime.retry_counter = 0;
        self.runtime.last_execution = Some(now);
        self.runtime.reschedule(time::add(now, self.definition.interval));
        self.statistics.record_success(duration);
        self.runtime.move_to(ActivityState::Idle)?;
        Ok(CycleOutcome::Succeeded)
    }

    /// The cycle failed with `reason`.
    ///
    /// Scheduler-wide reasons leave the retry counter and eligibility alone and
    /// return the activity to `Scheduled`. Any other reason consumes one retry:
    /// within budget the activity waits `backoff.delay(retry_counter)` in
    /// `Retrying`, beyond it the activity is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the activity is not inside a cycle.
    pub fn complete_failure<R: Rng + ?Sized>(
        &mut self,
        failure: FailureRecord,
        duration: Duration,
        backoff: &BackoffPolicy,
        rng: &mut R,
    ) -> Result<CycleOutcome, TransitionError> {
        self.runtime.move_to(ActivityState::Failed)?;
        let reason = failure.reason;
        let now = failure.at;
        self.statistics.record_failure(reason, duration);
        self.runtime.last_failure = Some(failure);

        if reason.is_scheduler_wide() {
            self.runtime.move_to(ActivityState::Scheduled)?;
            return Ok(CycleOutcome::Deferred { reason });
        }

        let attempt = self.runtime.retry_counter.saturating_add(1);
        if attempt <= self.definition.max_retries {
            let delay = backoff.delay_with_jitter(attempt, rng);
            self.runtime.retry_counter = attempt;
            self.runtime.reschedule(time::add(now, delay));
            self.runtime.move_to(ActivityState::Retrying)?;
            Ok(CycleOutcome::Retrying {
                reason,
                attempt,
                delay_secs: delay.as_secs(),
            })
        } else {
            self.runtime.retry_counter = self.definition.max_retries;
            self.definition.enabled = false;
            self.runtime.move_to(ActivityState::Disabled)?;
            Ok(CycleOutcome::Disabled { reason })
        }
    }

    /// Operator enable: clears a terminal disablement and makes the activity
    /// eligible at `now` with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the activity is mid-cycle.
    pub fn enable(&mut self, now: Timestamp) -> Result<ActivityState, TransitionError> {
        let previous = self.runtime.move_to(ActivityState::Idle)?;
        self.definition.enabled = true;
        self.runtime.retry_counter = 0;
        self.runtime.reschedule(now);
        Ok(previous)
    }

    /// Operator disable: the activity rests in `Idle` and is never selected.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the activity is mid-cycle.
    pub fn disable(&mut self) -> Result<ActivityState, TransitionError> {
        let previous = self.runtime.move_to(ActivityState::Idle)?;
        self.definition.enabled = false;
        Ok(previous)
    }

    pub fn reset_statistics(&mut self) {
        self.statistics = ActivityStatistics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureReason;
    use crate::window::TimeWindow;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn t0() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn activity() -> Activity {
        let definition = ActivityDefinition::builder()
            .id("alliance_help")
            .kind("tap_template")
            .interval(secs(600))
            .build()
            .unwrap();
        Activity::new(definition, t0())
    }

    fn run_to_verifying(activity: &mut Activity, now: Timestamp) {
        activity.begin_cycle(now).unwrap();
        activity.advance(ActivityState::Ready).unwrap();
        activity.advance(ActivityState::Executing).unwrap();
        activity.advance(ActivityState::Verifying).unwrap();
    }

    fn fail(activity: &mut Activity, now: Timestamp, reason: FailureReason) -> CycleOutcome {
        let mut rng = StdRng::seed_from_u64(1);
        activity
            .complete_failure(
                FailureRecord::new(reason, "boom", now),
                secs(1),
                &BackoffPolicy::default(),
                &mut rng,
            )
            .unwrap()
    }

    #[test]
    fn should_be_due_immediately_after_registration() {
        let a = activity();
        assert_eq!(a.state(), ActivityState::Idle);
        assert_eq!(a.runtime.next_eligible, t0());
        assert!(a.is_due(t0(), NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn should_not_be_due_when_disabled() {
        let mut a = activity();
        a.disable().unwrap();
        assert!(!a.is_due(t0(), NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn should_not_be_due_when_outside_window() {
        let mut a = activity();
        a.definition.window = Some(TimeWindow::parse(Some("06:00"), Some("23:00")).unwrap());
        assert!(!a.is_due(t0(), NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
        assert!(a.is_due(t0(), NaiveTime::from_hms_opt(6, 0, 0).unwrap()));
    }

    #[test]
    fn should_reset_retries_and_wait_interval_when_succeeded() {
        let mut a = activity();
        run_to_verifying(&mut a, t0());
        fail(&mut a, t0(), FailureReason::TransientExecutionFailure);
        assert_eq!(a.runtime.retry_counter, 1);

        let later = t0() + chrono::Duration::seconds(120);
        run_to_verifying(&mut a, later);
        let outcome = a.complete_success(later, secs(3)).unwrap();

        assert_eq!(outcome, CycleOutcome::Succeeded);
        assert_eq!(a.state(), ActivityState::Idle);
        assert_eq!(a.runtime.retry_counter, 0);
        assert_eq!(a.runtime.last_execution, Some(later));
        assert_eq!(
            a.runtime.next_eligible,
            later + chrono::Duration::seconds(600)
        );
        assert_eq!(a.statistics.successes, 1);
    }

    #[test]
    fn should_back_off_then_disable_when_failing_repeatedly() {
        let mut a = activity();
        let mut delays = Vec::new();
        let mut now = t0();
        for _ in 0..3 {
            run_to_verifying(&mut a, now);
            match fail(&mut a, now, FailureReason::TransientExecutionFailure) {
                CycleOutcome::Retrying { delay_secs, .. } => delays.push(delay_secs),
                other => panic!("unexpected outcome {other:?}"),
            }
            assert_eq!(a.state(), ActivityState::Retrying);
            now = a.runtime.next_eligible;
        }
        assert_eq!(delays, vec![60, 120, 240]);

        run_to_verifying(&mut a, now);
        let outcome = fail(&mut a, now, FailureReason::TransientExecutionFailure);
        assert_eq!(
            outcome,
            CycleOutcome::Disabled {
                reason: FailureReason::TransientExecutionFailure
            }
        );
        assert_eq!(a.state(), ActivityState::Disabled);
        assert!(!a.is_enabled());
        assert!(a.runtime.retry_counter <= a.definition.max_retries);
        assert_eq!(a.statistics.failures, 4);
    }

    #[test]
    fn should_leave_retry_counter_alone_when_skipped() {
        let mut a = activity();
        a.begin_cycle(t0()).unwrap();
        let outcome = a.complete_skip(t0(), secs(60)).unwrap();

        assert_eq!(outcome, CycleOutcome::Skipped { poll_delay_secs: 60 });
        assert_eq!(a.state(), ActivityState::Skipped);
        assert_eq!(a.runtime.retry_counter, 0);
        assert_eq!(a.statistics.failures, 0);
        assert_eq!(a.statistics.skips, 1);
        assert_eq!(a.runtime.next_eligible, t0() + chrono::Duration::seconds(60));
    }

    #[test]
    fn should_poll_after_interval_when_interval_is_shorter() {
        let mut a = activity();
        a.definition.interval = secs(10);
        a.begin_cycle(t0()).unwrap();
        a.complete_skip(t0(), secs(60)).unwrap();
        assert_eq!(a.runtime.next_eligible, t0() + chrono::Duration::seconds(10));
    }

    #[test]
    fn should_not_consume_retry_when_resource_unavailable() {
        let mut a = activity();
        a.begin_cycle(t0()).unwrap();
        let outcome = fail(&mut a, t0(), FailureReason::ResourceUnavailable);

        assert_eq!(
            outcome,
            CycleOutcome::Deferred {
                reason: FailureReason::ResourceUnavailable
            }
        );
        assert_eq!(a.state(), ActivityState::Scheduled);
        assert_eq!(a.runtime.retry_counter, 0);
        assert_eq!(a.runtime.next_eligible, t0());
        assert_eq!(
            a.statistics.failures_by_reason[&FailureReason::ResourceUnavailable],
            1
        );
    }

    #[test]
    fn should_keep_last_failure_for_diagnostics() {
        let mut a = activity();
        run_to_verifying(&mut a, t0());
        fail(&mut a, t0(), FailureReason::VerificationUncertain);
        let last = a.runtime.last_failure.as_ref().unwrap();
        assert_eq!(last.reason, FailureReason::VerificationUncertain);
        assert_eq!(last.message, "boom");
    }

    #[test]
    fn should_reject_failure_when_not_in_cycle() {
        let mut a = activity();
        let mut rng = StdRng::seed_from_u64(1);
        let result = a.complete_failure(
            FailureRecord::new(FailureReason::Timeout, "late", t0()),
            secs(1),
            &BackoffPolicy::default(),
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn should_restore_eligibility_when_enabled_after_disablement() {
        let mut a = activity();
        a.definition.max_retries = 0;
        run_to_verifying(&mut a, t0());
        fail(&mut a, t0(), FailureReason::Timeout);
        assert_eq!(a.state(), ActivityState::Disabled);

        let later = t0() + chrono::Duration::hours(1);
        let previous = a.enable(later).unwrap();
        assert_eq!(previous, ActivityState::Disabled);
        assert_eq!(a.state(), ActivityState::Idle);
        assert!(a.is_enabled());
        assert_eq!(a.runtime.retry_counter, 0);
        assert_eq!(a.runtime.next_eligible, later);
    }

    #[test]
    fn should_refuse_enable_when_mid_cycle() {
        let mut a = activity();
        a.begin_cycle(t0()).unwrap();
        assert!(a.enable(t0()).is_err());
        assert!(a.disable().is_err());
    }

    #[test]
    fn should_normalize_resting_states_to_scheduled() {
        let mut a = activity();
        assert_eq!(a.normalize(), Some(ActivityState::Idle));
        assert_eq!(a.state(), ActivityState::Scheduled);
        assert_eq!(a.normalize(), None);

        a.begin_cycle(t0()).unwrap();
        a.complete_skip(t0(), secs(60)).unwrap();
        assert_eq!(a.normalize(), Some(ActivityState::Skipped));
        assert_eq!(a.state(), ActivityState::Scheduled);
    }

    #[test]
    fn should_keep_disabled_idle_activity_unscheduled() {
        let mut a = activity();
        a.disable().unwrap();
        assert_eq!(a.normalize(), None);
        assert_eq!(a.state(), ActivityState::Idle);
    }

    #[test]
    fn should_keep_next_eligible_after_last_execution() {
        let mut a = activity();
        run_to_verifying(&mut a, t0());
        a.complete_success(t0(), secs(1)).unwrap();
        // Enabling with a clock that went backwards must not break the invariant.
        a.enable(t0() - chrono::Duration::hours(1)).unwrap();
        assert!(a.runtime.next_eligible >= a.runtime.last_execution.unwrap());
    }
}
