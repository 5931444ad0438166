//! Logical-day arithmetic.
//!
//! A logical day is a 24 hour window that starts `day_start` after calendar
//! midnight. Daily quotas and review due dates are grouped by logical day, so
//! every boundary computed here must be exact.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use thiserror::Error;

/// Milliseconds in one logical day.
pub const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DayError {
    #[error("day start must be below 86400000 ms, got {0}")]
    InvalidDayStart(u32),
    #[error("utc offset must be within one day, got {0} s")]
    InvalidOffset(i32),
}

/// Converts timestamps into logical-day boundaries.
///
/// "Calendar midnight" is taken in the boundary's fixed UTC offset.
///
/// ```
/// # use study_core::day::DayBoundary;
/// # use chrono::{TimeZone, Utc};
/// // Days start at 04:00 UTC.
/// let boundary = DayBoundary::utc(4 * 3_600_000)?;
/// let late_night = Utc.with_ymd_and_hms(2024, 3, 2, 2, 30, 0).unwrap();
/// let start = boundary.start_of_day(late_night);
/// assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap());
/// # Ok::<(), study_core::day::DayError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    day_start_ms: u32,
    offset: FixedOffset,
}

impl DayBoundary {
    /// Builds a boundary from a millisecond-of-day offset and a calendar offset.
    ///
    /// # Errors
    ///
    /// Returns `DayError::InvalidDayStart` if `day_start_ms` is a full day or more.
    pub fn new(day_start_ms: u32, offset: FixedOffset) -> Result<Self, DayError> {
        if i64::from(day_start_ms) >= DAY_MS {
            return Err(DayError::InvalidDayStart(day_start_ms));
        }
        Ok(Self {
            day_start_ms,
            offset,
        })
    }

    /// Boundary whose calendar is UTC.
    ///
    /// # Errors
    ///
    /// Returns `DayError::InvalidDayStart` if `day_start_ms` is a full day or more.
    pub fn utc(day_start_ms: u32) -> Result<Self, DayError> {
        Self::new(day_start_ms, Utc.fix())
    }

    /// Boundary with a calendar offset given in seconds east of UTC.
    ///
    /// # Errors
    ///
    /// Returns `DayError` if either value is out of range.
    pub fn with_offset_secs(day_start_ms: u32, offset_secs: i32) -> Result<Self, DayError> {
        let offset =
            FixedOffset::east_opt(offset_secs).ok_or(DayError::InvalidOffset(offset_secs))?;
        Self::new(day_start_ms, offset)
    }

    /// Boundary whose calendar is UTC and whose day starts at `start`,
    /// truncated to the second.
    #[must_use]
    pub fn utc_at(start: NaiveTime) -> Self {
        Self {
            day_start_ms: start.num_seconds_from_midnight() * 1_000,
            offset: Utc.fix(),
        }
    }

    #[must_use]
    pub fn day_start_ms(&self) -> u32 {
        self.day_start_ms
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Start of the logical day containing `now`.
    ///
    /// Takes calendar midnight of `now`, adds the day-start offset, and steps
    /// back one day when that lands after `now`.
    #[must_use]
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let since_midnight = local.time().signed_duration_since(NaiveTime::MIN);
        let start = now - since_midnight + Duration::milliseconds(i64::from(self.day_start_ms));
        if start > now {
            start - Duration::days(1)
        } else {
            start
        }
    }

    /// Alias of [`Self::start_of_day`], used when stamping a deck's `today`.
    #[must_use]
    pub fn logical_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_day(now)
    }

    /// Rounded number of logical days from `start` to `end`.
    ///
    /// Returns 0 when either timestamp is absent.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn days_between(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> i64 {
        let (Some(start), Some(end)) = (start, end) else {
            return 0;
        };
        let ms = self
            .start_of_day(end)
            .signed_duration_since(self.start_of_day(start))
            .num_milliseconds();
        (ms as f64 / DAY_MS as f64).round() as i64
    }

    /// True when both timestamps fall in the same logical day.
    #[must_use]
    pub fn is_same_day(&self, a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
        self.days_between(a, b) == 0
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self {
            day_start_ms: 0,
            offset: Utc.fix(),
        }
    }
}
