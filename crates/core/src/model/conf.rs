use chrono::{Duration, NaiveTime};
use thiserror::Error;

use crate::day::{DayBoundary, DayError};
use crate::model::ids::ConfId;

/// Longest collapse window accepted, in seconds.
pub const MAX_COLLAPSE_SECS: u32 = 86_400;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfError {
    #[error("collapse time must be at most one day, got {0} s")]
    InvalidCollapseTime(u32),
    #[error(transparent)]
    Day(#[from] DayError),
}

//
// ─── STUDY CONF ────────────────────────────────────────────────────────────────
//

/// Study limits shared by one or more decks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyConf {
    id: ConfId,
    new_per_day: u32,
    new_pick_at_random: bool,
    review_per_day: u32,
    collapse_time: Option<u32>,
}

impl StudyConf {
    /// Creates a conf. A zero `new_per_day` is valid and disables new cards.
    ///
    /// # Errors
    ///
    /// Returns `ConfError::InvalidCollapseTime` if `collapse_time` exceeds one day.
    pub fn new(
        id: ConfId,
        new_per_day: u32,
        new_pick_at_random: bool,
        review_per_day: u32,
        collapse_time: Option<u32>,
    ) -> Result<Self, ConfError> {
        if let Some(secs) = collapse_time {
            if secs > MAX_COLLAPSE_SECS {
                return Err(ConfError::InvalidCollapseTime(secs));
            }
        }

        Ok(Self {
            id,
            new_per_day,
            new_pick_at_random,
            review_per_day,
            collapse_time,
        })
    }

    /// 20 new cards and 200 reviews per day, new cards in due order, collapse
    /// window inherited from the preferences.
    #[must_use]
    pub fn default_for(id: ConfId) -> Self {
        Self {
            id,
            new_per_day: 20,
            new_pick_at_random: false,
            review_per_day: 200,
            collapse_time: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConfId {
        self.id
    }

    #[must_use]
    pub fn new_per_day(&self) -> u32 {
        self.new_per_day
    }

    #[must_use]
    pub fn new_pick_at_random(&self) -> bool {
        self.new_pick_at_random
    }

    /// Stored for the review path; the scheduler's estimate does not cap by it.
    #[must_use]
    pub fn review_per_day(&self) -> u32 {
        self.review_per_day
    }

    #[must_use]
    pub fn collapse_time(&self) -> Option<u32> {
        self.collapse_time
    }

    /// Collapse window in effect, falling back to the preferences.
    #[must_use]
    pub fn collapse_window(&self, prefs: &Prefs) -> Duration {
        let secs = self.collapse_time.unwrap_or(prefs.collapse_time());
        Duration::seconds(i64::from(secs))
    }
}

//
// ─── PREFS ─────────────────────────────────────────────────────────────────────
//

/// Global study preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefs {
    boundary: DayBoundary,
    collapse_time: u32,
}

impl Prefs {
    /// # Errors
    ///
    /// Returns `ConfError::Day` for an out-of-range day start or offset and
    /// `ConfError::InvalidCollapseTime` for a collapse window over one day.
    pub fn new(day_start_ms: u32, utc_offset_secs: i32, collapse_time: u32) -> Result<Self, ConfError> {
        let boundary = DayBoundary::with_offset_secs(day_start_ms, utc_offset_secs)?;
        if collapse_time > MAX_COLLAPSE_SECS {
            return Err(ConfError::InvalidCollapseTime(collapse_time));
        }
        Ok(Self {
            boundary,
            collapse_time,
        })
    }

    #[must_use]
    pub fn day_start_ms(&self) -> u32 {
        self.boundary.day_start_ms()
    }

    #[must_use]
    pub fn utc_offset_secs(&self) -> i32 {
        self.boundary.offset().local_minus_utc()
    }

    #[must_use]
    pub fn collapse_time(&self) -> u32 {
        self.collapse_time
    }

    /// Day boundary described by these preferences.
    #[must_use]
    pub fn boundary(&self) -> DayBoundary {
        self.boundary
    }
}

impl Default for Prefs {
    /// Days start at 04:00 UTC; collapse window of 20 minutes.
    fn default() -> Self {
        Self {
            boundary: DayBoundary::utc_at(NaiveTime::MIN + Duration::hours(4)),
            collapse_time: 1_200,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conf_accepts_zero_new_cards() {
        let conf = StudyConf::new(ConfId::new(1), 0, false, 100, None).unwrap();
        assert_eq!(conf.new_per_day(), 0);
    }

    #[test]
    fn conf_rejects_long_collapse() {
        let err = StudyConf::new(ConfId::new(1), 5, false, 100, Some(90_000)).unwrap_err();
        assert_eq!(err, ConfError::InvalidCollapseTime(90_000));
    }

    #[test]
    fn collapse_window_falls_back_to_prefs() {
        let prefs = Prefs::default();
        let inherit = StudyConf::default_for(ConfId::new(1));
        assert_eq!(inherit.collapse_window(&prefs), Duration::seconds(1_200));

        let own = StudyConf::new(ConfId::new(2), 5, false, 100, Some(60)).unwrap();
        assert_eq!(own.collapse_window(&prefs), Duration::seconds(60));
    }

    #[test]
    fn prefs_validate_day_start() {
        assert!(matches!(
            Prefs::new(86_400_000, 0, 600),
            Err(ConfError::Day(DayError::InvalidDayStart(_)))
        ));
        let prefs = Prefs::new(3_600_000, 3_600, 600).unwrap();
        assert_eq!(prefs.boundary().day_start_ms(), 3_600_000);
    }

    #[test]
    fn prefs_keep_the_boundary_they_were_built_with() {
        let prefs = Prefs::new(7_200_000, -18_000, 600).unwrap();
        assert_eq!(prefs.boundary(), DayBoundary::with_offset_secs(7_200_000, -18_000).unwrap());
        assert_eq!(prefs.day_start_ms(), 7_200_000);
        assert_eq!(prefs.utc_offset_secs(), -18_000);

        assert!(matches!(
            Prefs::new(0, 90_000, 600),
            Err(ConfError::Day(DayError::InvalidOffset(90_000)))
        ));
    }

    #[test]
    fn default_prefs_start_the_day_at_four_utc() {
        let prefs = Prefs::default();
        assert_eq!(prefs.boundary(), DayBoundary::utc(4 * 3_600_000).unwrap());
        assert_eq!(prefs, Prefs::new(4 * 3_600_000, 0, 1_200).unwrap());
    }
}
