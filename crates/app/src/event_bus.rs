//! Scheduler event fan-out for the host.

use std::future::Future;

use tokio::sync::broadcast;

use minibot_domain::error::MiniBotError;
use minibot_domain::event::SchedulerEvent;

use crate::ports::EventPublisher;

/// Events kept for a subscriber that falls behind before it sees
/// [`broadcast::error::RecvError::Lagged`].
pub const EVENT_CAPACITY: usize = 256;

/// Broadcasts [`SchedulerEvent`]s to every subscriber.
///
/// The scheduler never waits on the bus: events published while nobody
/// listens are dropped.
#[derive(Debug, Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }
}

impl InProcessEventBus {
    /// Receiver of the events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(
        &self,
        event: SchedulerEvent,
    ) -> impl Future<Output = Result<(), MiniBotError>> + Send {
        if self.sender.send(event).is_err() {
            tracing::trace!("scheduler event dropped, no subscriber");
        }
        async { Ok(()) }
    }
}
