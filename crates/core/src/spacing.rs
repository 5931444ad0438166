use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ReviewGrade, ReviewOutcome};

/// Retention targeted when none is configured.
pub const DEFAULT_RETENTION: f32 = 0.9;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpacingError {
    #[error("FSRS scheduling failed: {0}")]
    Fsrs(String),
    #[error("desired retention must be in (0, 1], got {provided}")]
    InvalidRetention { provided: f32 },
    #[error("elapsed days must be non-negative and finite, got {provided}")]
    InvalidElapsedDays { provided: f64 },
}

//
// ─── MEMORY STATE ──────────────────────────────────────────────────────────────
//

/// FSRS memory state persisted with each reviewed card.
///
/// ```
/// # use study_core::spacing::MemoryState;
/// let state = MemoryState::new(5.0, 3.5);
/// assert_eq!(state.stability, 5.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub stability: f64,
    pub difficulty: f64,
}

impl MemoryState {
    #[must_use]
    pub fn new(stability: f64, difficulty: f64) -> Self {
        Self {
            stability,
            difficulty,
        }
    }

    #[must_use]
    pub fn from_outcome(outcome: &ReviewOutcome) -> Self {
        Self {
            stability: outcome.stability,
            difficulty: outcome.difficulty,
        }
    }
}

//
// ─── SCHEDULED STATES ──────────────────────────────────────────────────────────
//

/// Next interval and memory state for each possible grade.
#[derive(Debug, Clone)]
pub struct ScheduledStates {
    pub again: ReviewOutcome,
    pub hard: ReviewOutcome,
    pub good: ReviewOutcome,
    pub easy: ReviewOutcome,
}

impl ScheduledStates {
    #[must_use]
    pub fn select(&self, grade: ReviewGrade) -> &ReviewOutcome {
        match grade {
            ReviewGrade::Again => &self.again,
            ReviewGrade::Hard => &self.hard,
            ReviewGrade::Good => &self.good,
            ReviewGrade::Easy => &self.easy,
        }
    }
}

//
// ─── SPACING ───────────────────────────────────────────────────────────────────
//

/// FSRS interval calculator used by the review commit path.
///
/// ```
/// # use study_core::spacing::Spacing;
/// # use study_core::model::ReviewGrade;
/// let spacing = Spacing::new()?;
/// let now = chrono::Utc::now();
/// let outcome = spacing.outcome(None, ReviewGrade::Good, now, 0.0)?;
/// assert!(outcome.scheduled_days >= 1);
/// # Ok::<(), study_core::spacing::SpacingError>(())
/// ```
pub struct Spacing {
    fsrs: fsrs::FSRS,
    desired_retention: f32,
}

impl Spacing {
    /// Default FSRS parameters at 0.9 retention.
    ///
    /// # Errors
    ///
    /// Returns `SpacingError::Fsrs` if FSRS initialization fails.
    pub fn new() -> Result<Self, SpacingError> {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// # Errors
    ///
    /// - `InvalidRetention` if `desired_retention` is not in `(0, 1]`
    /// - `Fsrs` if FSRS initialization fails
    pub fn with_retention(desired_retention: f32) -> Result<Self, SpacingError> {
        if !desired_retention.is_finite() || desired_retention <= 0.0 || desired_retention > 1.0 {
            return Err(SpacingError::InvalidRetention {
                provided: desired_retention,
            });
        }

        let fsrs = fsrs::FSRS::new(Some(&[])).map_err(|e| SpacingError::Fsrs(e.to_string()))?;

        Ok(Self {
            fsrs,
            desired_retention,
        })
    }

    #[must_use]
    pub fn desired_retention(&self) -> f32 {
        self.desired_retention
    }

    /// All four candidate outcomes. Pass `None` for a card never reviewed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidElapsedDays` for negative or non-finite `elapsed_days`,
    /// `Fsrs` if FSRS scheduling fails.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn next_states(
        &self,
        memory: Option<&MemoryState>,
        reviewed_at: DateTime<Utc>,
        elapsed_days: f64,
    ) -> Result<ScheduledStates, SpacingError> {
        if !elapsed_days.is_finite() || elapsed_days < 0.0 {
            return Err(SpacingError::InvalidElapsedDays {
                provided: elapsed_days,
            });
        }

        let current = memory.map(|m| fsrs::MemoryState {
            stability: m.stability as f32,
            difficulty: m.difficulty as f32,
        });
        let days = if current.is_some() {
            elapsed_days.round() as u32
        } else {
            0
        };

        let next = self
            .fsrs
            .next_states(current, self.desired_retention, days)
            .map_err(|e| SpacingError::Fsrs(e.to_string()))?;

        Ok(ScheduledStates {
            again: to_outcome(&next.again, reviewed_at, elapsed_days),
            hard: to_outcome(&next.hard, reviewed_at, elapsed_days),
            good: to_outcome(&next.good, reviewed_at, elapsed_days),
            easy: to_outcome(&next.easy, reviewed_at, elapsed_days),
        })
    }

    /// Outcome for a single grade.
    ///
    /// # Errors
    ///
    /// See [`Self::next_states`].
    pub fn outcome(
        &self,
        memory: Option<&MemoryState>,
        grade: ReviewGrade,
        reviewed_at: DateTime<Utc>,
        elapsed_days: f64,
    ) -> Result<ReviewOutcome, SpacingError> {
        let states = self.next_states(memory, reviewed_at, elapsed_days)?;
        Ok(states.select(grade).clone())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_outcome(item: &fsrs::ItemState, now: DateTime<Utc>, elapsed_days: f64) -> ReviewOutcome {
    // Whole days, never below one.
    let interval_days = item.interval.round().max(1.0) as u32;
    let next_review = now + Duration::days(i64::from(interval_days));

    ReviewOutcome::new(
        next_review,
        f64::from(item.memory.stability),
        f64::from(item.memory.difficulty),
        elapsed_days,
        interval_days,
    )
}

/// Fractional days between the last review and now; 0 for unreviewed cards.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_days(last_review: Option<DateTime<Utc>>, reviewed_at: DateTime<Utc>) -> f64 {
    match last_review {
        Some(last) => reviewed_at.signed_duration_since(last).num_seconds() as f64 / 86_400.0,
        None => 0.0,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
