//! Spawned scheduler loop and the handle the host drives it with.
//!
//! The loop owns the [`Scheduler`]; the host talks to it through a command
//! channel and reads the latest status from a watch channel. A cycle always
//! runs to completion inside the loop, so [`SchedulerHandle::stop`] waits
//! for the current cycle before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use minibot_domain::activity::ActivityDefinition;
use minibot_domain::error::MiniBotError;
use minibot_domain::id::ActivityId;
use minibot_domain::statistics::StatisticsSnapshot;
use minibot_domain::status::{SchedulerStatus, UpcomingRun};

use super::{Scheduler, Tick};
use crate::ports::{Clock, DeviceCapability, EventPublisher};

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, MiniBotError>>;

enum Command {
    Register(Box<ActivityDefinition>, Reply<()>),
    Unregister(ActivityId, Reply<()>),
    RunNow(ActivityId, Reply<()>),
    Enable(ActivityId, Reply<()>),
    Disable(ActivityId, Reply<()>),
    Resume(oneshot::Sender<bool>),
    ResetStatistics(Option<ActivityId>, Reply<()>),
    Statistics(oneshot::Sender<StatisticsSnapshot>),
    Upcoming(usize, oneshot::Sender<Vec<UpcomingRun>>),
}

/// Cloneable handle to a spawned scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SchedulerStatus>,
    shutdown: Arc<Notify>,
    stop: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Start `scheduler` and run it on the current tokio runtime.
pub fn spawn<D, C, P>(mut scheduler: Scheduler<D, C, P>) -> SchedulerHandle
where
    D: DeviceCapability + 'static,
    C: Clock + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status) = watch::channel(scheduler.status());
    let shutdown = Arc::new(Notify::new());
    let stop = scheduler.stop_flag();

    let loop_shutdown = Arc::clone(&shutdown);
    let task = tokio::spawn(async move {
        scheduler.start().await;
        status_tx.send_replace(scheduler.status());
        run_loop(&mut scheduler, receiver, &status_tx, &loop_shutdown).await;
        scheduler.stop().await;
        status_tx.send_replace(scheduler.status());
    });

    SchedulerHandle {
        commands,
        status,
        shutdown,
        stop,
        task: Arc::new(Mutex::new(Some(task))),
    }
}

async fn run_loop<D, C, P>(
    scheduler: &mut Scheduler<D, C, P>,
    mut commands: mpsc::Receiver<Command>,
    status: &watch::Sender<SchedulerStatus>,
    shutdown: &Notify,
) where
    D: DeviceCapability + 'static,
    C: Clock,
    P: EventPublisher + Sync,
{
    let mut ticker = tokio::time::interval(scheduler.settings().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shutdown.notified() => break,
            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!("every handle dropped, leaving scheduler loop");
                    break;
                };
                handle_command(scheduler, command).await;
            }
            _ = ticker.tick() => {
                if scheduler.tick().await == Tick::Stopped {
                    break;
                }
            }
        }
        status.send_replace(scheduler.status());
    }
}

async fn handle_command<D, C, P>(scheduler: &mut Scheduler<D, C, P>, command: Command)
where
    D: DeviceCapability + 'static,
    C: Clock,
    P: EventPublisher + Sync,
{
    match command {
        Command::Register(definition, reply) => {
            let _ = reply.send(scheduler.register(*definition).await);
        }
        Command::Unregister(id, reply) => {
            let _ = reply.send(scheduler.unregister(&id).await.map(|_| ()));
        }
        Command::RunNow(id, reply) => {
            let result = scheduler.run_now(&id);
            if result.is_ok() {
                scheduler.tick().await;
            }
            let _ = reply.send(result);
        }
        Command::Enable(id, reply) => {
            let _ = reply.send(scheduler.enable(&id).await);
        }
        Command::Disable(id, reply) => {
            let _ = reply.send(scheduler.disable(&id).await);
        }
        Command::Resume(reply) => {
            let _ = reply.send(scheduler.resume().await);
        }
        Command::ResetStatistics(id, reply) => {
            let _ = reply.send(scheduler.reset_statistics(id.as_ref()));
        }
        Command::Statistics(reply) => {
            let _ = reply.send(scheduler.statistics());
        }
        Command::Upcoming(limit, reply) => {
            let _ = reply.send(scheduler.upcoming(limit));
        }
    }
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, MiniBotError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| MiniBotError::SchedulerUnavailable)?;
        response.await.map_err(|_| MiniBotError::SchedulerUnavailable)
    }

    /// # Errors
    ///
    /// Same as [`Scheduler::register`], or
    /// [`MiniBotError::SchedulerUnavailable`] once the loop is gone.
    pub async fn register(&self, definition: ActivityDefinition) -> Result<(), MiniBotError> {
        self.request(|reply| Command::Register(Box::new(definition), reply))
            .await?
    }

    /// # Errors
    ///
    /// Same as [`Scheduler::unregister`].
    pub async fn unregister(&self, id: ActivityId) -> Result<(), MiniBotError> {
        self.request(|reply| Command::Unregister(id, reply)).await?
    }

    /// Queue a run; returns once the loop has ticked for it.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::run_now`].
    pub async fn run_now(&self, id: ActivityId) -> Result<(), MiniBotError> {
        self.request(|reply| Command::RunNow(id, reply)).await?
    }

    /// # Errors
    ///
    /// Same as [`Scheduler::enable`].
    pub async fn enable(&self, id: ActivityId) -> Result<(), MiniBotError> {
        self.request(|reply| Command::Enable(id, reply)).await?
    }

    /// # Errors
    ///
    /// Same as [`Scheduler::disable`].
    pub async fn disable(&self, id: ActivityId) -> Result<(), MiniBotError> {
        self.request(|reply| Command::Disable(id, reply)).await?
    }

    /// Clear a pause or halt. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Returns [`MiniBotError::SchedulerUnavailable`] once the loop is gone.
    pub async fn resume(&self) -> Result<bool, MiniBotError> {
        self.request(Command::Resume).await
    }

    /// # Errors
    ///
    /// Same as [`Scheduler::reset_statistics`].
    pub async fn reset_statistics(&self, id: Option<ActivityId>) -> Result<(), MiniBotError> {
        self.request(|reply| Command::ResetStatistics(id, reply))
            .await?
    }

    /// # Errors
    ///
    /// Returns [`MiniBotError::SchedulerUnavailable`] once the loop is gone.
    pub async fn statistics(&self) -> Result<StatisticsSnapshot, MiniBotError> {
        self.request(Command::Statistics).await
    }

    /// # Errors
    ///
    /// Returns [`MiniBotError::SchedulerUnavailable`] once the loop is gone.
    pub async fn upcoming(&self, limit: usize) -> Result<Vec<UpcomingRun>, MiniBotError> {
        self.request(|reply| Command::Upcoming(limit, reply)).await
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    /// Ask the loop to stop and wait for it to finish.
    ///
    /// A running cycle completes first; tasks see the request through
    /// `TaskContext::stop_requested`. Returns the final status.
    pub async fn stop(&self) -> SchedulerStatus {
        self.stop.store(true, Ordering::Release);
        self.shutdown.notify_one();
        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "scheduler loop crashed");
            }
        }
        self.status()
    }
}
