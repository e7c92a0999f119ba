//! Clock port: every scheduling, window and timeout decision reads time here.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{FixedOffset, Local, NaiveDateTime, Offset, TimeDelta, Utc};
use futures::future::BoxFuture;
use minibot_domain::time::{self, Timestamp};

/// Source of wall-clock time and of delays.
pub trait Clock: Send + Sync {
    /// Current UTC instant.
    fn now(&self) -> Timestamp;

    /// Convert an instant into local wall-clock time.
    fn local(&self, at: Timestamp) -> NaiveDateTime;

    /// Current local wall-clock time, used for time-window gating.
    fn local_now(&self) -> NaiveDateTime {
        self.local(self.now())
    }

    /// Wait for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// The real clock: system time, the host's local timezone and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::now()
    }

    fn local(&self, at: Timestamp) -> NaiveDateTime {
        at.with_timezone(&Local).naive_local()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Simulated clock that only moves when told to.
///
/// Sleeping advances the clock instantly, so a task pausing for a minute
/// completes immediately while consuming a minute of its execution budget.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
    offset: FixedOffset,
}

impl ManualClock {
    /// A clock frozen at `start`, with local time equal to UTC.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self::with_offset(start, Utc.fix())
    }

    /// A clock frozen at `start` whose local time is `offset` away from UTC.
    #[must_use]
    pub fn with_offset(start: Timestamp, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(start),
            offset,
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now = time::add(*now, by);
    }

    /// Move forward to the next occurrence of the local wall-clock `hour:minute`.
    pub fn advance_to_local(&self, hour: u32, minute: u32) {
        let mut now = self.lock();
        let local = now.with_timezone(&self.offset).naive_local();
        let Some(target_time) = chrono::NaiveTime::from_hms_opt(hour, minute, 0) else {
            return;
        };
        let mut target = local.date().and_time(target_time);
        if target <= local {
            target += TimeDelta::days(1);
        }
        let delta = target - local;
        *now += delta;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        self.now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.lock()
    }

    fn local(&self, at: Timestamp) -> NaiveDateTime {
        at.with_timezone(&self.offset).naive_local()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn local(&self, at: Timestamp) -> NaiveDateTime {
        (**self).local(at)
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn should_stay_frozen_until_advanced() {
        let clock = ManualClock::new(start());
        assert_eq!(clock.now(), start());
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start() + TimeDelta::seconds(90));
    }

    #[test]
    fn should_apply_fixed_offset_to_local_time() {
        let clock = ManualClock::with_offset(start(), FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(clock.local_now().hour(), 14);
    }

    #[test]
    fn should_advance_to_next_local_time_of_day() {
        let clock = ManualClock::new(start());
        clock.advance_to_local(2, 0);
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap());
        clock.advance_to_local(6, 30);
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2026, 3, 11, 6, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn should_advance_when_sleeping() {
        let clock = ManualClock::new(start());
        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.now(), start() + TimeDelta::seconds(5));
    }
}
