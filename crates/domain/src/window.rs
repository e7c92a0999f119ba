//! Time window: the daily local-time range during which an activity may run.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Daily eligibility window evaluated against the local wall clock.
///
/// Either bound may be absent: a missing `start` means "from midnight", a
/// missing `end` means "until midnight". When `start > end` the window spans
/// midnight (e.g. `22:00..06:00`). Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTimeWindow", into = "RawTimeWindow")]
pub struct TimeWindow {
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
}

impl TimeWindow {
    /// Build a window from optional bounds.
    #[must_use]
    pub fn new(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        Self { start, end }
    }

    /// Parse a window from optional `HH:MM` strings.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedTimeOfDay`] when a bound does not parse.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ValidationError> {
        Ok(Self {
            start: start.map(parse_time_of_day).transpose()?,
            end: end.map(parse_time_of_day).transpose()?,
        })
    }

    #[must_use]
    pub fn start(&self) -> Option<NaiveTime> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Option<NaiveTime> {
        self.end
    }

    /// Whether neither bound is configured (always open).
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether the given local time of day falls inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        match (self.start, self.end) {
            (None, None) => true,
            (Some(start), None) => time >= start,
            (None, Some(end)) => time <= end,
            (Some(start), Some(end)) if start <= end => time >= start && time <= end,
            // Overnight range (e.g. 22:00..06:00)
            (Some(start), Some(end)) => time >= start || time <= end,
        }
    }

    /// Earliest local instant at or after `from` that lies inside the window.
    #[must_use]
    pub fn next_opening(&self, from: NaiveDateTime) -> NaiveDateTime {
        if self.contains(from.time()) {
            return from;
        }
        // Outside the window: only a configured start can reopen it today or
        // tomorrow. A window with only an end reopens at the next midnight.
        let opening = self.start.unwrap_or_default();
        let today = from.date().and_time(opening);
        if today > from {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_bound = |t: Option<NaiveTime>| t.map(|t| t.format("%H:%M").to_string());
        write!(
            f,
            "{}..{}",
            fmt_bound(self.start).unwrap_or_default(),
            fmt_bound(self.end).unwrap_or_default()
        )
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ValidationError::MalformedTimeOfDay(value.to_string()))
}

/// Wire format: optional `"HH:MM"` strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawTimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<String>,
}

impl TryFrom<RawTimeWindow> for TimeWindow {
    type Error = ValidationError;

    fn try_from(raw: RawTimeWindow) -> Result<Self, Self::Error> {
        Self::parse(raw.start.as_deref(), raw.end.as_deref())
    }
}

impl From<TimeWindow> for RawTimeWindow {
    fn from(window: TimeWindow) -> Self {
        Self {
            start: window.start.map(|t| t.format("%H:%M").to_string()),
            end: window.end.map(|t| t.format("%H:%M").to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_time(hm(h, m))
    }

    #[test]
    fn should_contain_any_time_when_unbounded() {
        let w = TimeWindow::default();
        assert!(w.is_unbounded());
        assert!(w.contains(hm(2, 0)));
        assert!(w.contains(hm(23, 59)));
    }

    #[test]
    fn should_exclude_early_morning_from_daytime_window() {
        let w = TimeWindow::parse(Some("06:00"), Some("23:00")).unwrap();
        assert!(!w.contains(hm(2, 0)));
        assert!(w.contains(hm(6, 0)));
        assert!(w.contains(hm(12, 30)));
        assert!(w.contains(hm(23, 0)));
        assert!(!w.contains(hm(23, 1)));
    }

    #[test]
    fn should_wrap_around_midnight_when_start_after_end() {
        let w = TimeWindow::parse(Some("22:00"), Some("06:00")).unwrap();
        assert!(w.contains(hm(23, 0)));
        assert!(w.contains(hm(2, 0)));
        assert!(!w.contains(hm(12, 0)));
    }

    #[test]
    fn should_honour_single_bound() {
        let after = TimeWindow::parse(Some("08:00"), None).unwrap();
        assert!(!after.contains(hm(7, 59)));
        assert!(after.contains(hm(20, 0)));

        let before = TimeWindow::parse(None, Some("08:00")).unwrap();
        assert!(before.contains(hm(7, 59)));
        assert!(!before.contains(hm(20, 0)));
    }

    #[test]
    fn should_reject_malformed_time_of_day() {
        assert_eq!(
            TimeWindow::parse(Some("6am"), None).unwrap_err(),
            ValidationError::MalformedTimeOfDay("6am".to_string())
        );
    }

    #[test]
    fn should_return_same_instant_when_already_open() {
        let w = TimeWindow::parse(Some("06:00"), Some("23:00")).unwrap();
        assert_eq!(w.next_opening(at(10, 9, 0)), at(10, 9, 0));
    }

    #[test]
    fn should_open_later_today_when_before_start() {
        let w = TimeWindow::parse(Some("06:00"), Some("23:00")).unwrap();
        assert_eq!(w.next_opening(at(10, 2, 0)), at(10, 6, 0));
    }

    #[test]
    fn should_open_tomorrow_when_after_end() {
        let w = TimeWindow::parse(Some("06:00"), Some("23:00")).unwrap();
        assert_eq!(w.next_opening(at(10, 23, 30)), at(11, 6, 0));
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let w = TimeWindow::parse(Some("06:00"), Some("23:00")).unwrap();
        let json = serde_json::to_value(w).unwrap();
        assert_eq!(json, serde_json::json!({"start": "06:00", "end": "23:00"}));
        let parsed: TimeWindow = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, w);
    }

    #[test]
    fn should_display_window_bounds() {
        let w = TimeWindow::parse(Some("06:00"), None).unwrap();
        assert_eq!(w.to_string(), "06:00..");
    }
}
