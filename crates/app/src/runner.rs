//! Activity cycle runner: drives one check → execute → verify cycle.
//!
//! The runner owns the in-cycle transitions (`CheckingPrerequisites`,
//! `Ready`, `Executing`, `Verifying`) and hands the terminal bookkeeping to
//! the [`Activity`] aggregate. Whatever a task does, including panicking,
//! ends up as a [`CycleOutcome`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use tracing::Instrument;

use minibot_domain::activity::{Activity, ActivityState};
use minibot_domain::error::TransitionError;
use minibot_domain::event::SchedulerEvent;
use minibot_domain::failure::{CycleOutcome, FailureRecord};
use minibot_domain::id::RunId;
use minibot_domain::retry::BackoffPolicy;
use minibot_domain::time::{self, Timestamp};

use crate::ports::{Clock, DeviceCapability, EventPublisher};
use crate::settings::Pacing;
use crate::task::{Phase, StepError, Task, TaskContext, classify};

/// Everything a cycle borrows from its scheduler.
pub struct CycleEnv<'a, D, P> {
    pub device: &'a D,
    pub clock: &'a dyn Clock,
    pub publisher: &'a P,
    pub stop: &'a AtomicBool,
    pub pacing: Pacing,
    pub backoff: &'a BackoffPolicy,
    pub min_poll_interval: Duration,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub run_id: RunId,
    pub outcome: CycleOutcome,
    pub duration: Duration,
    /// Message of the failure, when the cycle failed.
    pub message: Option<String>,
}

/// How the task steps ended, before bookkeeping.
enum Steps {
    Skipped,
    Verified,
    Failed { phase: Phase, error: StepError },
}

/// Publish an event, logging instead of failing when nobody can take it.
pub(crate) async fn emit<P: EventPublisher>(publisher: &P, event: SchedulerEvent) {
    if let Err(err) = publisher.publish(event).await {
        tracing::warn!(error = %err, "failed to publish scheduler event");
    }
}

/// Run one full cycle of `activity` with `task`.
///
/// # Errors
///
/// Returns [`TransitionError`] when the activity was not in a selectable
/// state; nothing was run in that case.
pub async fn run_cycle<D, P, R>(
    activity: &mut Activity,
    task: &mut dyn Task<D>,
    env: &CycleEnv<'_, D, P>,
    rng: &mut R,
) -> Result<CycleReport, TransitionError>
where
    D: DeviceCapability,
    P: EventPublisher + Sync,
    R: Rng + Send + ?Sized,
{
    let run_id = RunId::new();
    let span = tracing::info_span!(
        "cycle",
        activity_id = %activity.id(),
        run_id = %run_id,
        kind = %activity.definition.kind,
    );
    drive_cycle(activity, task, env, rng, run_id)
        .instrument(span)
        .await
}

async fn drive_cycle<D, P, R>(
    activity: &mut Activity,
    task: &mut dyn Task<D>,
    env: &CycleEnv<'_, D, P>,
    rng: &mut R,
    run_id: RunId,
) -> Result<CycleReport, TransitionError>
where
    D: DeviceCapability,
    P: EventPublisher + Sync,
    R: Rng + Send + ?Sized,
{
    let started = env.clock.now();
    let deadline = activity.deadline(started);
    let from = activity.begin_cycle(started)?;
    publish_transition(env, activity, from).await;
    tracing::info!("cycle started");

    let steps = run_steps(activity, task, env, deadline).await;

    let finished = env.clock.now();
    let duration = time::elapsed(started, finished);
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    let before = activity.state();
    let (outcome, message) = match steps {
        Steps::Skipped => (
            activity.complete_skip(finished, env.min_poll_interval)?,
            None,
        ),
        Steps::Verified => (activity.complete_success(finished, duration)?, None),
        Steps::Failed { phase, error } => {
            let reason = classify(phase, &error);
            let message = format!("{phase}: {error}");
            tracing::warn!(%phase, %reason, error = %error, "cycle failed");
            let record = FailureRecord::new(reason, message.clone(), finished);
            (
                activity.complete_failure(record, duration, env.backoff, rng)?,
                Some(message),
            )
        }
    };
    publish_transition(env, activity, before).await;

    match &outcome {
        CycleOutcome::Disabled { reason } => {
            tracing::warn!(%reason, "retry budget exhausted, activity disabled");
        }
        other => tracing::info!(outcome = %other, duration_ms, "cycle finished"),
    }

    emit(
        env.publisher,
        SchedulerEvent::CycleCompleted {
            activity_id: activity.id().clone(),
            run_id,
            outcome: outcome.clone(),
            duration_ms,
            at: finished,
        },
    )
    .await;

    Ok(CycleReport {
        run_id,
        outcome,
        duration,
        message,
    })
}

async fn run_steps<D, P>(
    activity: &mut Activity,
    task: &mut dyn Task<D>,
    env: &CycleEnv<'_, D, P>,
    deadline: Timestamp,
) -> Steps
where
    D: DeviceCapability,
    P: EventPublisher + Sync,
{
    let id = activity.id().clone();
    let ctx = TaskContext::new(env.device, env.clock, &id, env.stop, env.pacing, deadline);

    let checked = guarded(Phase::Check, async {
        ctx.checkpoint()?;
        let proceed = task.check(&ctx).await?;
        ctx.checkpoint()?;
        Ok(proceed)
    })
    .await;
    match checked {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("prerequisite not met");
            return Steps::Skipped;
        }
        Err(error) => return Steps::Failed { phase: Phase::Check, error },
    }

    if let Err(error) = advance(env, activity, ActivityState::Ready).await {
        return Steps::Failed { phase: Phase::Check, error };
    }
    if let Err(error) = advance(env, activity, ActivityState::Executing).await {
        return Steps::Failed { phase: Phase::Execute, error };
    }
    let executed = guarded(Phase::Execute, async {
        ctx.checkpoint()?;
        task.execute(&ctx).await?;
        // The body ran; running out of budget right after it is still a timeout.
        ctx.checkpoint()
    })
    .await;
    if let Err(error) = executed {
        return Steps::Failed { phase: Phase::Execute, error };
    }

    if let Err(error) = advance(env, activity, ActivityState::Verifying).await {
        return Steps::Failed { phase: Phase::Verify, error };
    }
    let verified = guarded(Phase::Verify, async {
        let confirmed = task.verify(&ctx).await?;
        ctx.checkpoint()?;
        Ok(confirmed)
    })
    .await;
    match verified {
        Ok(true) => Steps::Verified,
        Ok(false) => Steps::Failed {
            phase: Phase::Verify,
            error: StepError::Failed("effect not observed".to_string()),
        },
        Err(error) => Steps::Failed { phase: Phase::Verify, error },
    }
}

/// Await a step, turning a panic into [`StepError::Panicked`].
async fn guarded<T, F>(phase: Phase, step: F) -> Result<T, StepError>
where
    F: Future<Output = Result<T, StepError>> + Send,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%phase, panic = %message, "task panicked");
            Err(StepError::Panicked(message))
        }
    }
}

async fn advance<D, P>(
    env: &CycleEnv<'_, D, P>,
    activity: &mut Activity,
    next: ActivityState,
) -> Result<(), StepError>
where
    P: EventPublisher + Sync,
{
    let from = activity
        .advance(next)
        .map_err(|err| StepError::Failed(err.to_string()))?;
    publish_transition(env, activity, from).await;
    Ok(())
}

async fn publish_transition<D, P>(env: &CycleEnv<'_, D, P>, activity: &Activity, from: ActivityState)
where
    P: EventPublisher + Sync,
{
    let to = activity.state();
    if from == to {
        return;
    }
    tracing::debug!(%from, %to, "state changed");
    emit(
        env.publisher,
        SchedulerEvent::StateChanged {
            activity_id: activity.id().clone(),
            from,
            to,
            at: env.clock.now(),
        },
    )
    .await;
}
