//! Time bounds and clocks
//!
//! [`TimeRange`] is the optional `[start, end)` filter used by list and trim.
//! Date strings supplied by callers are parsed here. For listing, an empty
//! string (or one that names the epoch itself) leaves that side of the range
//! unbounded. Trims take their bounds literally.
//!
//! [`Clock`] is the wall-clock source for lease expiry. It is injected so that
//! tests can move time forward deterministically.

use std::fmt;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{Result, Error};

/// Time range for listing and trimming log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start time (inclusive), `None` when unbounded
    pub start: Option<DateTime<Utc>>,
    /// End time (exclusive), `None` when unbounded
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// A range with no bounds on either side
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A range bounded on both sides
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start: Some(start), end: Some(end) }
    }

    /// Parse a range from caller-supplied date strings.
    ///
    /// The start bound is parsed before the end bound and the first failure is
    /// reported.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_date_str(start)?;
        let end = parse_date_str(end)?;
        Ok(Self { start, end })
    }

    /// Parse a range whose bounds are taken literally.
    ///
    /// Unlike [`TimeRange::parse`], the epoch stays a concrete timestamp, so an
    /// end bound of `0` selects nothing rather than everything.
    pub fn parse_explicit(start: &str, end: &str) -> Result<Self> {
        let start = parse_timestamp(start)?;
        let end = parse_timestamp(end)?;
        Ok(Self { start, end })
    }

    /// Check if a timestamp falls inside the range
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *timestamp >= start)
            && self.end.map_or(true, |end| *timestamp < end)
    }

    /// Check if neither side is bounded
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{}, ", start.to_rfc3339())?,
            None => write!(f, "[-inf, ")?,
        }
        match self.end {
            Some(end) => write!(f, "{})", end.to_rfc3339()),
            None => write!(f, "+inf)"),
        }
    }
}

/// Parse a caller-supplied date string.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// `YYYY-MM-DD`, or whole seconds since the epoch. The result is truncated to
/// whole seconds. Empty input and the epoch itself both mean "unbounded".
pub fn parse_date_str(input: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(parse_timestamp(input)?.filter(|ts| ts.timestamp() != 0))
}

/// Parse a caller-supplied date string, keeping the epoch as a timestamp.
///
/// Only empty input yields `None`.
pub fn parse_timestamp(input: &str) -> Result<Option<DateTime<Utc>>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let parsed = parse_date(input).ok_or_else(|| {
        debug!(date = input, "error parsing date");
        Error::invalid_argument(format!("Invalid date: {}", input))
    })?;

    // Sub-second precision is dropped
    let seconds = parsed.timestamp();
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| Error::invalid_argument(format!("Date out of range: {}", input)))
}

fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    if input.bytes().all(|b| b.is_ascii_digit()) {
        let seconds = input.parse::<i64>().ok()?;
        return DateTime::from_timestamp(seconds, 0);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Source of wall-clock time for lease expiry
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a manual clock starting at the given time
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Set the clock to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
