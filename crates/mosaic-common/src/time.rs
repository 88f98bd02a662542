//! Acquisition time windows.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Default length of an animation sub-window in days.
pub const DEFAULT_FRAME_DAYS: i64 = 90;

/// A closed time window used to search the scene catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse a `start/end` window. Each side may be a date (`2024-01-15`),
    /// a naive datetime or an RFC 3339 timestamp.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))?;
        let start = parse_instant(start.trim())?;
        let end = parse_instant(end.trim())?;
        if end < start {
            return Err(TimeParseError::Inverted(s.to_string()));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    /// Split the window into consecutive sub-windows of at most `days` days.
    ///
    /// Sub-windows share their boundary instant; the last one is truncated to
    /// the end of the window. A zero-length window yields nothing.
    pub fn subdivide(&self, days: i64) -> Vec<TimeRange> {
        let step = Duration::days(days.max(1));
        let mut windows = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = (cursor + step).min(self.end);
            windows.push(TimeRange::new(cursor, next));
            cursor = next;
        }
        windows
    }

    /// Date-only `YYYY-MM-DD/YYYY-MM-DD` form used by catalog searches.
    pub fn to_date_string(&self) -> String {
        format!(
            "{}/{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Time window ends before it starts: {0}")]
    Inverted(String),
}
