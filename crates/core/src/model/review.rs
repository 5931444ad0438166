use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::card::CardState;
use crate::model::ids::{CardId, DeckId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur during review operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("invalid review grade value: {0}")]
    InvalidGrade(u8),
}

//
// ─── REVIEW GRADE ─────────────────────────────────────────────────────────────
//

/// Four-level answer rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewGrade {
    /// Failed to recall. The card re-enters learning.
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewGrade {
    /// Converts a stored grade (0-3) to a `ReviewGrade`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidGrade` if the value is not in the range 0-3.
    pub fn from_u8(value: u8) -> Result<Self, ReviewError> {
        match value {
            0 => Ok(Self::Again),
            1 => Ok(Self::Hard),
            2 => Ok(Self::Good),
            3 => Ok(Self::Easy),
            _ => Err(ReviewError::InvalidGrade(value)),
        }
    }

    /// Storage encoding, inverse of [`Self::from_u8`].
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            ReviewGrade::Again => 0,
            ReviewGrade::Hard => 1,
            ReviewGrade::Good => 2,
            ReviewGrade::Easy => 3,
        }
    }
}

//
// ─── REVIEW OUTCOME ──────────────────────────────────────────────────────────
//

/// Output of the spacing algorithm for one grade.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub next_review: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: f64,
    /// Interval in whole days, at least 1.
    pub scheduled_days: u32,
}

impl ReviewOutcome {
    #[must_use]
    pub fn new(
        next_review: DateTime<Utc>,
        stability: f64,
        difficulty: f64,
        elapsed_days: f64,
        scheduled_days: u32,
    ) -> Self {
        Self {
            next_review,
            stability,
            difficulty,
            elapsed_days,
            scheduled_days,
        }
    }
}

//
// ─── REVIEW LOG ───────────────────────────────────────────────────────────────
//

/// Record of a single answer, appended by the review commit path.
///
/// `id` is the review time in epoch milliseconds so a deck's `revlogs_today`
/// can reference the entry before it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLog {
    pub id: i64,
    pub card_id: CardId,
    pub deck_id: DeckId,
    pub grade: ReviewGrade,
    /// State of the card before the answer.
    pub state: CardState,
    pub reviewed_at: DateTime<Utc>,
    pub elapsed_days: f64,
    pub scheduled_days: u32,
    pub stability: f64,
    pub difficulty: f64,
    /// Due time after the answer.
    pub due: DateTime<Utc>,
}

impl ReviewLog {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        card_id: CardId,
        deck_id: DeckId,
        grade: ReviewGrade,
        state: CardState,
        reviewed_at: DateTime<Utc>,
        outcome: &ReviewOutcome,
        scheduled_days: u32,
        due: DateTime<Utc>,
    ) -> Self {
        Self {
            id: reviewed_at.timestamp_millis(),
            card_id,
            deck_id,
            grade,
            state,
            reviewed_at,
            elapsed_days: outcome.elapsed_days,
            scheduled_days,
            stability: outcome.stability,
            difficulty: outcome.difficulty,
            due,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
