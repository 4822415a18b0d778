use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Fixed-width RFC 3339 with microseconds; lexical order is chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Hands out strictly increasing UTC timestamps, even when the wall clock
/// stalls or steps backwards.
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.next_after(Utc::now())
    }

    /// Raise the floor to `at` (e.g. the newest timestamp already stored).
    pub fn observe(&self, at: DateTime<Utc>) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.is_none_or(|prev| at > prev) {
            *last = Some(truncate(at));
        }
    }

    fn next_after(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let wall = truncate(wall);
        let next = match *last {
            Some(prev) if wall <= prev => prev + Duration::microseconds(1),
            _ => wall,
        };
        *last = Some(next);
        next
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

// Stored precision is microseconds; drop the rest so comparisons match storage.
fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    at - Duration::nanoseconds(i64::from(at.timestamp_subsec_nanos() % 1_000))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Also accepts SQLite's `datetime('now')` form.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            assert!(format_timestamp(next) > format_timestamp(prev));
            prev = next;
        }
    }

    #[test]
    fn test_wall_clock_going_backwards() {
        let clock = MonotonicClock::new();
        let future = Utc::now() + Duration::hours(1);
        clock.observe(future);
        let next = clock.now();
        assert_eq!(next, truncate(future) + Duration::microseconds(1));
    }

    #[test]
    fn test_format_round_trip() {
        let clock = MonotonicClock::new();
        let at = clock.now();
        let text = format_timestamp(at);
        assert_eq!(text.len(), "2025-07-15T09:00:00.000000Z".len());
        assert_eq!(parse_timestamp(&text), Some(at));
        assert!(parse_timestamp("2025-07-15 09:00:00").is_some());
        assert!(parse_timestamp("garbage").is_none());
    }
}
