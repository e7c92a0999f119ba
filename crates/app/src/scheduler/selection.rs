//! Due-set computation and ordering.
//!
//! An activity is due when it is enabled, rests in a selectable state, its
//! `next_eligible` instant has passed and the local time of day lies inside
//! its window. Due activities are served by priority (highest first), then
//! by `next_eligible` (earliest first), then by registration order.

use std::cmp::Ordering;

use chrono::{NaiveDateTime, NaiveTime};

use minibot_domain::activity::{Activity, ActivityState};
use minibot_domain::status::UpcomingRun;
use minibot_domain::time::Timestamp;

/// Ordering of two due activities, given their registration indices.
fn serve_order(a: (usize, &Activity), b: (usize, &Activity)) -> Ordering {
    b.1.definition
        .priority
        .cmp(&a.1.definition.priority)
        .then_with(|| a.1.runtime.next_eligible.cmp(&b.1.runtime.next_eligible))
        .then_with(|| a.0.cmp(&b.0))
}

/// Indices of the due activities, in serving order.
pub(crate) fn due_set<'a>(
    activities: impl Iterator<Item = &'a Activity>,
    now: Timestamp,
    local_time: NaiveTime,
) -> Vec<usize> {
    let mut due: Vec<(usize, &Activity)> = activities
        .enumerate()
        .filter(|(_, activity)| activity.is_due(now, local_time))
        .collect();
    due.sort_by(|a, b| serve_order(*a, *b));
    due.into_iter().map(|(index, _)| index).collect()
}

/// Index of the activity to run next, if any.
pub(crate) fn pick<'a>(
    activities: impl Iterator<Item = &'a Activity>,
    now: Timestamp,
    local_time: NaiveTime,
) -> Option<usize> {
    activities
        .enumerate()
        .filter(|(_, activity)| activity.is_due(now, local_time))
        .min_by(|a, b| serve_order(*a, *b))
        .map(|(index, _)| index)
}

/// The next `limit` enabled activities ordered by when they become eligible.
///
/// `to_local` converts an instant to local wall-clock time; the expected
/// local start accounts for the activity's window.
pub(crate) fn upcoming<'a>(
    activities: impl Iterator<Item = &'a Activity>,
    now: Timestamp,
    to_local: impl Fn(Timestamp) -> NaiveDateTime,
    limit: usize,
) -> Vec<UpcomingRun> {
    let mut candidates: Vec<(usize, &Activity)> = activities
        .enumerate()
        .filter(|(_, activity)| {
            activity.is_enabled() && activity.state() != ActivityState::Disabled
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.1.runtime
            .next_eligible
            .cmp(&b.1.runtime.next_eligible)
            .then_with(|| b.1.definition.priority.cmp(&a.1.definition.priority))
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates
        .into_iter()
        .take(limit)
        .map(|(_, activity)| {
            let earliest = activity.runtime.next_eligible.max(now);
            let local = to_local(earliest);
            let expected_local = activity
                .definition
                .window
                .map_or(local, |window| window.next_opening(local));
            UpcomingRun {
                id: activity.definition.id.clone(),
                name: activity.definition.name.clone(),
                priority: activity.definition.priority,
                next_eligible: activity.runtime.next_eligible,
                expected_local,
            }
        })
        .collect()
}
