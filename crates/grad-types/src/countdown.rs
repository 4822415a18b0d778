use chrono::{DateTime, NaiveDateTime, Utc};

use crate::api::CountdownResponse;

/// Time remaining until a target instant, split into display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub total_seconds: u64,
}

impl Remaining {
    pub fn is_zero(&self) -> bool {
        self.total_seconds == 0
    }
}

/// Remaining time from `now` to `target`, rounded up to whole seconds so it
/// only reaches zero once the target has passed. Never negative.
pub fn remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> Remaining {
    let millis = (target - now).num_milliseconds().max(0) as u64;
    let total_seconds = millis.div_ceil(1_000);
    Remaining {
        days: total_seconds / 86_400,
        hours: (total_seconds / 3_600) % 24,
        minutes: (total_seconds / 60) % 60,
        seconds: total_seconds % 60,
        total_seconds,
    }
}

/// Share of the `start..target` span already elapsed at `now`, in percent,
/// clamped to `0.0..=100.0`.
pub fn progress_percent(start: DateTime<Utc>, target: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let span = (target - start).num_milliseconds();
    if span <= 0 {
        return 100.0;
    }
    let elapsed = (now - start).num_milliseconds();
    (elapsed as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn countdown(start: DateTime<Utc>, target: DateTime<Utc>, now: DateTime<Utc>) -> CountdownResponse {
    let left = remaining(target, now);
    CountdownResponse {
        target,
        days: left.days,
        hours: left.hours,
        minutes: left.minutes,
        seconds: left.seconds,
        total_seconds: left.total_seconds,
        finished: left.is_zero(),
        progress_percent: progress_percent(start, target, now),
    }
}

/// Parse a configured date. Accepts RFC 3339, or a naive
/// `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD` read as UTC.
pub fn parse_target(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(s: &str) -> DateTime<Utc> {
        parse_target(s).unwrap()
    }

    #[test]
    fn test_remaining_units() {
        let now = at("2025-07-10T08:58:30");
        let target = at("2025-07-15T09:00:00");
        let left = remaining(target, now);
        assert_eq!(left.days, 5);
        assert_eq!(left.hours, 0);
        assert_eq!(left.minutes, 1);
        assert_eq!(left.seconds, 30);
        assert!(!left.is_zero());
    }

    #[test]
    fn test_zero_after_target() {
        let target = at("2025-07-15T09:00:00");
        let left = remaining(target, target + Duration::days(3));
        assert_eq!(
            left,
            Remaining { days: 0, hours: 0, minutes: 0, seconds: 0, total_seconds: 0 }
        );

        let resp = countdown(at("2024-01-01"), target, target + Duration::seconds(1));
        assert!(resp.finished);
        assert_eq!(resp.total_seconds, 0);
        assert_eq!(resp.progress_percent, 100.0);
    }

    #[test]
    fn test_not_finished_within_last_second() {
        let target = at("2025-07-15T09:00:00");
        let left = remaining(target, target - Duration::milliseconds(400));
        assert_eq!(left.total_seconds, 1);
        assert_eq!(left.seconds, 1);
        assert!(!left.is_zero());

        let resp = countdown(at("2024-01-01"), target, target - Duration::milliseconds(1));
        assert!(!resp.finished);
        assert!(countdown(at("2024-01-01"), target, target).finished);
    }

    #[test]
    fn test_progress() {
        let start = at("2024-01-01");
        let target = at("2024-01-11");
        assert_eq!(progress_percent(start, target, at("2024-01-06")), 50.0);
        assert_eq!(progress_percent(start, target, at("2023-12-01")), 0.0);
        assert_eq!(progress_percent(target, start, at("2024-01-06")), 100.0);
    }

    #[test]
    fn test_parse_formats() {
        assert!(parse_target("2025-07-15T09:00:00Z").is_some());
        assert!(parse_target("2025-07-15T09:00:00").is_some());
        assert!(parse_target("2025-07-15").is_some());
        assert!(parse_target("July 15").is_none());
    }
}
