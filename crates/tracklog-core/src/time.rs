//! Nanosecond time helpers
//!
//! Log timestamps are signed nanosecond counts. Negative values are legal
//! (clocks before the epoch, simulated time) and order naturally.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nanoseconds in one second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// An inclusive time window over log timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// First timestamp included (`None` = unbounded)
    pub start: Option<i64>,
    /// Last timestamp included (`None` = unbounded)
    pub end: Option<i64>,
}

impl TimeRange {
    /// Range covering every timestamp
    pub fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Range `[start, end]`
    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Range `[start, ..)`
    pub fn starting_at(start: i64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Range `(.., end]`
    pub fn ending_at(end: i64) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Whether a timestamp falls inside the range
    pub fn contains(&self, time_nanos: i64) -> bool {
        self.start.map_or(true, |s| time_nanos >= s) && self.end.map_or(true, |e| time_nanos <= e)
    }

    /// A range whose start lies after its end matches nothing
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Convert a non-negative nanosecond delta to a `Duration` (negatives clamp to zero)
pub fn nanos_to_duration(nanos: i64) -> Duration {
    if nanos <= 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

/// Convert a `Duration` to nanoseconds, saturating at `i64::MAX`
pub fn duration_to_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let range = TimeRange::between(10, 20);
        assert!(!range.contains(9));
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(21));

        assert!(TimeRange::all().contains(i64::MIN));
        assert!(TimeRange::starting_at(-5).contains(-5));
        assert!(!TimeRange::ending_at(-5).contains(0));
    }

    #[test]
    fn test_empty_range() {
        assert!(TimeRange::between(5, 4).is_empty());
        assert!(!TimeRange::between(5, 5).is_empty());
        assert!(!TimeRange::all().is_empty());
    }

    #[test]
    fn test_duration_conversion() {
        assert_eq!(nanos_to_duration(-3), Duration::ZERO);
        assert_eq!(nanos_to_duration(1_500), Duration::from_nanos(1_500));
        assert_eq!(duration_to_nanos(Duration::from_millis(500)), 500_000_000);
        assert_eq!(duration_to_nanos(Duration::MAX), i64::MAX);
    }
}
