//! Half-open time windows used for fetching and filtering events.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_WINDOW_DAYS;

/// A `[start, end)` window of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Default for DateRange {
    /// Default range: ±DEFAULT_WINDOW_DAYS around now
    fn default() -> Self {
        let now = Utc::now();
        DateRange {
            start: now - Duration::days(DEFAULT_WINDOW_DAYS),
            end: now + Duration::days(DEFAULT_WINDOW_DAYS),
        }
    }
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        DateRange { start, end }
    }

    /// Parse CLI-style bounds.
    /// - `from`: YYYY-MM-DD, start of that day (defaults to now - DEFAULT_WINDOW_DAYS)
    /// - `to`: YYYY-MM-DD, inclusive day, so the window ends at the following midnight
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        let default = DateRange::default();

        let start = match from {
            Some(s) => start_of_day(parse_date(s)?),
            None => default.start,
        };
        let end = match to {
            Some(s) => start_of_day(parse_date(s)? + Duration::days(1)),
            None => default.end,
        };

        if end <= start {
            return Err(format!(
                "Invalid range: {} is not after {}",
                end.format("%Y-%m-%d"),
                start.format("%Y-%m-%d")
            ));
        }

        Ok(DateRange { start, end })
    }

    /// Widen the window by whole days on each side.
    pub fn expand(&self, days_before: i64, days_after: i64) -> Self {
        DateRange {
            start: self.start - Duration::days(days_before),
            end: self.end + Duration::days(days_after),
        }
    }

    /// True if `other` lies entirely inside this window.
    pub fn covers(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339()
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339()
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
