//! Scheduler: owns the registered activities and decides what runs next.
//!
//! [`Scheduler::tick`] is the unit of progress: it normalizes resting states,
//! picks at most one activity (queued run-now requests first, then the head
//! of the due set) and drives it through one cycle. At most one activity
//! holds the device at any time because a tick runs its cycle to completion
//! before returning.
//!
//! The scheduler is host-agnostic; [`handle::spawn`] runs it on a tokio task
//! and exposes a cloneable [`SchedulerHandle`].

pub mod handle;
mod selection;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;

use minibot_domain::activity::{Activity, ActivityDefinition, ActivityState};
use minibot_domain::error::{ConflictError, MiniBotError, NotFoundError, ValidationError};
use minibot_domain::event::SchedulerEvent;
use minibot_domain::failure::{CycleOutcome, FailureReason};
use minibot_domain::id::{ActivityId, RunId};
use minibot_domain::statistics::{ActivityStatisticsEntry, AggregateCounters, StatisticsSnapshot};
use minibot_domain::status::{ActivityStatus, RunState, SchedulerStatus, UpcomingRun};
use minibot_domain::time::{self, Timestamp};

pub use handle::SchedulerHandle;

use crate::ports::{Clock, DeviceCapability, EventPublisher};
use crate::runner::{CycleEnv, CycleReport, emit, run_cycle};
use crate::settings::SchedulerSettings;
use crate::task::Task;
use crate::task_registry::TaskRegistry;

/// What one [`Scheduler::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The scheduler is not started, or a stop was requested.
    Stopped,
    /// Waiting for an operator after a critical safety condition.
    Halted,
    /// Waiting for the device to answer again.
    Paused,
    /// Nothing was due.
    Idle,
    /// One cycle ran.
    Ran {
        activity_id: ActivityId,
        run_id: RunId,
        outcome: CycleOutcome,
    },
}

struct Entry<D> {
    activity: Activity,
    task: Box<dyn Task<D>>,
}

pub struct Scheduler<D, C, P> {
    device: D,
    clock: C,
    publisher: P,
    registry: TaskRegistry<D>,
    settings: SchedulerSettings,
    entries: Vec<Entry<D>>,
    requested: VecDeque<ActivityId>,
    run_state: RunState,
    halted_reason: Option<String>,
    last_probe: Option<Timestamp>,
    started_at: Option<Timestamp>,
    totals: AggregateCounters,
    stop: Arc<AtomicBool>,
    rng: StdRng,
}

impl<D, C, P> Scheduler<D, C, P>
where
    D: DeviceCapability + 'static,
    C: Clock,
    P: EventPublisher + Sync,
{
    pub fn new(
        device: D,
        clock: C,
        publisher: P,
        registry: TaskRegistry<D>,
        settings: SchedulerSettings,
    ) -> Self {
        let rng = settings
            .rng_seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            device,
            clock,
            publisher,
            registry,
            settings,
            entries: Vec::new(),
            requested: VecDeque::new(),
            run_state: RunState::Stopped,
            halted_reason: None,
            last_probe: None,
            started_at: None,
            totals: AggregateCounters::default(),
            stop: Arc::new(AtomicBool::new(false)),
            rng,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    #[must_use]
    pub fn activity(&self, id: &ActivityId) -> Option<&Activity> {
        self.entries
            .iter()
            .map(|entry| &entry.activity)
            .find(|activity| activity.id() == id)
    }

    /// Flag observed by running tasks; set it to wind the current cycle down.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn position(&self, id: &ActivityId) -> Result<usize, NotFoundError> {
        self.entries
            .iter()
            .position(|entry| entry.activity.id() == id)
            .ok_or_else(|| NotFoundError {
                entity: "Activity",
                id: id.to_string(),
            })
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Allow ticks to select work.
    pub async fn start(&mut self) {
        if self.run_state != RunState::Stopped {
            return;
        }
        let now = self.clock.now();
        self.stop.store(false, Ordering::Release);
        self.run_state = RunState::Running;
        self.started_at = Some(now);
        tracing::info!(activities = self.entries.len(), "scheduler started");
        emit(&self.publisher, SchedulerEvent::Started { at: now }).await;
    }

    /// Stop selecting work. Does not interrupt a cycle; the spawned loop only
    /// calls this between ticks.
    pub async fn stop(&mut self) {
        if self.run_state == RunState::Stopped {
            return;
        }
        self.stop.store(true, Ordering::Release);
        self.run_state = RunState::Stopped;
        tracing::info!("scheduler stopped");
        emit(
            &self.publisher,
            SchedulerEvent::Stopped {
                at: self.clock.now(),
            },
        )
        .await;
    }

    /// Leave the paused or halted state.
    ///
    /// Returns whether the scheduler was paused or halted.
    pub async fn resume(&mut self) -> bool {
        if !matches!(self.run_state, RunState::Paused | RunState::Halted) {
            return false;
        }
        self.run_state = RunState::Running;
        self.halted_reason = None;
        self.last_probe = None;
        tracing::info!("scheduler resumed by operator");
        emit(
            &self.publisher,
            SchedulerEvent::Resumed {
                at: self.clock.now(),
            },
        )
        .await;
        true
    }

    // ── Registration ───────────────────────────────────────────

    /// Register an activity, eligible immediately.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::Validation`] when the definition is invalid or
    /// its task kind or parameters are rejected, and
    /// [`MiniBotError::Conflict`] when the id is already registered.
    #[tracing::instrument(skip(self, definition), fields(activity_id = %definition.id))]
    pub async fn register(&mut self, definition: ActivityDefinition) -> Result<(), MiniBotError> {
        definition.validate()?;
        if self.position(&definition.id).is_ok() {
            return Err(ConflictError {
                entity: "Activity",
                id: definition.id.to_string(),
            }
            .into());
        }
        let task = self
            .registry
            .build(&definition.kind, &definition.parameters)?;
        let now = self.clock.now();
        let activity = Activity::new(definition, now);
        tracing::info!(
            kind = %activity.definition.kind,
            priority = activity.definition.priority,
            interval_secs = activity.definition.interval.as_secs(),
            "activity registered"
        );
        let event = SchedulerEvent::ActivityRegistered {
            activity_id: activity.id().clone(),
            at: now,
        };
        self.entries.push(Entry { activity, task });
        emit(&self.publisher, event).await;
        Ok(())
    }

    /// Remove an activity and any run-now request for it.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::NotFound`] when the id is unknown.
    pub async fn unregister(&mut self, id: &ActivityId) -> Result<Activity, MiniBotError> {
        let index = self.position(id)?;
        let entry = self.entries.remove(index);
        self.requested.retain(|queued| queued != id);
        tracing::info!(activity_id = %id, "activity unregistered");
        emit(
            &self.publisher,
            SchedulerEvent::ActivityUnregistered {
                activity_id: id.clone(),
                at: self.clock.now(),
            },
        )
        .await;
        Ok(entry.activity)
    }

    // ── Operator controls ──────────────────────────────────────

    /// Queue an activity to run at the next tick, regardless of eligibility
    /// and window. Still blocked while the scheduler is paused or halted.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::NotFound`] when the id is unknown and
    /// [`MiniBotError::Validation`] when the activity is disabled.
    pub fn run_now(&mut self, id: &ActivityId) -> Result<(), MiniBotError> {
        let index = self.position(id)?;
        if !self.entries[index].activity.is_enabled() {
            return Err(ValidationError::ActivityDisabled(id.to_string()).into());
        }
        if !self.requested.contains(id) {
            self.requested.push_back(id.clone());
        }
        tracing::info!(activity_id = %id, queued = self.requested.len(), "run requested");
        Ok(())
    }

    /// Re-enable an activity with a fresh retry budget, eligible now.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::NotFound`] when the id is unknown.
    pub async fn enable(&mut self, id: &ActivityId) -> Result<(), MiniBotError> {
        let index = self.position(id)?;
        let now = self.clock.now();
        let activity = &mut self.entries[index].activity;
        let from = activity.enable(now)?;
        tracing::info!(activity_id = %id, "activity enabled");
        let to = activity.state();
        self.publish_state_change(id, from, to).await;
        Ok(())
    }

    /// Disable an activity; it stays registered but is never selected.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::NotFound`] when the id is unknown.
    pub async fn disable(&mut self, id: &ActivityId) -> Result<(), MiniBotError> {
        let index = self.position(id)?;
        let activity = &mut self.entries[index].activity;
        let from = activity.disable()?;
        let to = activity.state();
        self.requested.retain(|queued| queued != id);
        tracing::info!(activity_id = %id, "activity disabled");
        self.publish_state_change(id, from, to).await;
        Ok(())
    }

    /// Reset the statistics of one activity, or of everything when `id` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::NotFound`] when the id is unknown.
    pub fn reset_statistics(&mut self, id: Option<&ActivityId>) -> Result<(), MiniBotError> {
        match id {
            Some(id) => {
                let index = self.position(id)?;
                self.entries[index].activity.reset_statistics();
            }
            None => {
                for entry in &mut self.entries {
                    entry.activity.reset_statistics();
                }
                self.totals = AggregateCounters::default();
                if self.started_at.is_some() {
                    self.started_at = Some(self.clock.now());
                }
            }
        }
        tracing::info!(activity_id = ?id.map(ActivityId::as_str), "statistics reset");
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            run_state: self.run_state,
            halted_reason: self.halted_reason.clone(),
            activities: self
                .entries
                .iter()
                .map(|entry| ActivityStatus::from(&entry.activity))
                .collect(),
        }
    }

    #[must_use]
    pub fn statistics(&self) -> StatisticsSnapshot {
        let now = self.clock.now();
        StatisticsSnapshot {
            started_at: self.started_at,
            uptime: self
                .started_at
                .map(|started| time::elapsed(started, now))
                .unwrap_or_default(),
            totals: self.totals.clone(),
            activities: self
                .entries
                .iter()
                .map(|entry| ActivityStatisticsEntry {
                    id: entry.activity.id().clone(),
                    name: entry.activity.definition.name.clone(),
                    statistics: entry.activity.statistics.clone(),
                })
                .collect(),
        }
    }

    /// The next `limit` enabled activities by eligibility.
    #[must_use]
    pub fn upcoming(&self, limit: usize) -> Vec<UpcomingRun> {
        selection::upcoming(
            self.entries.iter().map(|entry| &entry.activity),
            self.clock.now(),
            |at| self.clock.local(at),
            limit,
        )
    }

    /// Ids of the activities due right now, in serving order.
    #[must_use]
    pub fn due_set(&self) -> Vec<ActivityId> {
        let now = self.clock.now();
        let local_time = self.clock.local(now).time();
        selection::due_set(self.entries.iter().map(|e| &e.activity), now, local_time)
            .into_iter()
            .map(|index| self.entries[index].activity.id().clone())
            .collect()
    }

    // ── Scheduling ─────────────────────────────────────────────

    /// Select and run at most one activity.
    pub async fn tick(&mut self) -> Tick {
        if self.run_state == RunState::Stopped || self.stop.load(Ordering::Acquire) {
            return Tick::Stopped;
        }
        if self.run_state == RunState::Halted {
            return Tick::Halted;
        }
        if self.run_state == RunState::Paused && !self.probe_recovery().await {
            return Tick::Paused;
        }

        self.normalize().await;
        let Some(index) = self.select() else {
            return Tick::Idle;
        };
        self.run(index).await
    }

    async fn normalize(&mut self) {
        let Self {
            entries, publisher, clock, ..
        } = self;
        for entry in entries.iter_mut() {
            if let Some(from) = entry.activity.normalize() {
                let event = SchedulerEvent::StateChanged {
                    activity_id: entry.activity.id().clone(),
                    from,
                    to: entry.activity.state(),
                    at: clock.now(),
                };
                emit(&*publisher, event).await;
            }
        }
    }

    /// Queued run-now requests first, then the head of the due set.
    fn select(&mut self) -> Option<usize> {
        while let Some(id) = self.requested.pop_front() {
            let Ok(index) = self.position(&id) else {
                continue;
            };
            let activity = &self.entries[index].activity;
            if activity.is_enabled() && activity.state().is_selectable() {
                tracing::debug!(activity_id = %id, "serving run-now request");
                return Some(index);
            }
            tracing::debug!(activity_id = %id, state = %activity.state(), "dropping run-now request");
        }
        let now = self.clock.now();
        let local_time = self.clock.local(now).time();
        selection::pick(self.entries.iter().map(|e| &e.activity), now, local_time)
    }

    async fn run(&mut self, index: usize) -> Tick {
        let Self {
            device,
            clock,
            publisher,
            settings,
            entries,
            stop,
            rng,
            ..
        } = self;
        let entry = &mut entries[index];
        let env = CycleEnv {
            device: &*device,
            clock: &*clock as &dyn Clock,
            publisher: &*publisher,
            stop: stop.as_ref(),
            pacing: settings.pacing,
            backoff: &settings.backoff,
            min_poll_interval: settings.min_poll_interval,
        };
        let report = match run_cycle(&mut entry.activity, entry.task.as_mut(), &env, rng).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(activity_id = %entry.activity.id(), error = %err, "cycle refused");
                return Tick::Idle;
            }
        };
        let activity_id = entry.activity.id().clone();
        self.apply(&activity_id, &report).await;
        Tick::Ran {
            activity_id,
            run_id: report.run_id,
            outcome: report.outcome,
        }
    }

    /// Account for a finished cycle and react to scheduler-wide failures.
    async fn apply(&mut self, activity_id: &ActivityId, report: &CycleReport) {
        match report.outcome.failure_reason() {
            None if matches!(report.outcome, CycleOutcome::Skipped { .. }) => {
                self.totals.record_skip();
            }
            None => self.totals.record_success(),
            Some(reason) => self.totals.record_failure(reason),
        }
        let message = report.message.clone().unwrap_or_default();
        match report.outcome.failure_reason() {
            Some(FailureReason::ResourceUnavailable) => self.pause(message).await,
            Some(FailureReason::CriticalSafetyCondition) => {
                self.halt(activity_id, message).await;
            }
            _ => {}
        }
    }

    async fn pause(&mut self, message: String) {
        let now = self.clock.now();
        self.run_state = RunState::Paused;
        self.last_probe = Some(now);
        tracing::warn!(reason = %message, "device unavailable, scheduler paused");
        emit(&self.publisher, SchedulerEvent::Paused { message, at: now }).await;
    }

    async fn halt(&mut self, activity_id: &ActivityId, message: String) {
        self.run_state = RunState::Halted;
        self.halted_reason = Some(message.clone());
        tracing::error!(%activity_id, reason = %message, "critical safety condition, scheduler halted");
        emit(
            &self.publisher,
            SchedulerEvent::Halted {
                activity_id: activity_id.clone(),
                message,
                at: self.clock.now(),
            },
        )
        .await;
    }

    /// Ask the device whether it is back, at most once per probe interval.
    async fn probe_recovery(&mut self) -> bool {
        let now = self.clock.now();
        if self.last_probe.is_some_and(|probed| {
            time::elapsed(probed, now) < self.settings.recovery_probe_interval
        }) {
            return false;
        }
        self.last_probe = Some(now);
        if !self.device.is_available().await {
            tracing::debug!("device still unavailable");
            return false;
        }
        self.run_state = RunState::Running;
        self.last_probe = None;
        tracing::info!("device available again, scheduler resumed");
        emit(&self.publisher, SchedulerEvent::Resumed { at: now }).await;
        true
    }

    async fn publish_state_change(&self, id: &ActivityId, from: ActivityState, to: ActivityState) {
        if from == to {
            return;
        }
        emit(
            &self.publisher,
            SchedulerEvent::StateChanged {
                activity_id: id.clone(),
                from,
                to,
                at: self.clock.now(),
            },
        )
        .await;
    }
}
