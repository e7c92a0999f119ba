//! Event bus port: publish/subscribe for scheduler events.

use std::future::Future;

use minibot_domain::error::MiniBotError;
use minibot_domain::event::SchedulerEvent;

/// Publishes scheduler events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(
        &self,
        event: SchedulerEvent,
    ) -> impl Future<Output = Result<(), MiniBotError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: SchedulerEvent,
    ) -> impl Future<Output = Result<(), MiniBotError>> + Send {
        (**self).publish(event)
    }
}
