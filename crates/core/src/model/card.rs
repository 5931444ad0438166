use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::ids::{CardId, DeckId};
use crate::model::review::{ReviewGrade, ReviewOutcome};
use crate::spacing::MemoryState;

/// Delay before a card answered `Again` is due again.
pub const AGAIN_STEP: Duration = Duration::minutes(1);
/// Delay before a new or learning card answered `Hard` is due again.
pub const HARD_STEP: Duration = Duration::minutes(10);

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("unknown card state: {0}")]
    UnknownState(String),
    #[error("unknown card queue: {0}")]
    UnknownQueue(i64),
    #[error("invalid persisted card state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATE & QUEUE ─────────────────────────────────────────────────────────────
//

/// Learning state of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
            CardState::Relearning => "relearning",
        }
    }

    /// Parses the storage representation produced by [`Self::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `CardError::UnknownState` for any other string.
    pub fn parse(s: &str) -> Result<Self, CardError> {
        match s {
            "new" => Ok(Self::New),
            "learning" => Ok(Self::Learning),
            "review" => Ok(Self::Review),
            "relearning" => Ok(Self::Relearning),
            other => Err(CardError::UnknownState(other.to_owned())),
        }
    }

    /// Learning and relearning cards step through short same-day intervals.
    #[must_use]
    pub fn is_learning(self) -> bool {
        matches!(self, CardState::Learning | CardState::Relearning)
    }
}

/// Queue marker. Suspended and buried cards are never offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CardQueue {
    #[default]
    Active,
    /// Suspended by the user.
    Suspended,
    /// Buried until the next gather that clears it.
    Buried,
}

impl CardQueue {
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            CardQueue::Active => 0,
            CardQueue::Suspended => 1,
            CardQueue::Buried => 2,
        }
    }

    /// # Errors
    ///
    /// Returns `CardError::UnknownQueue` for values other than 0, 1 and 2.
    pub fn from_i64(value: i64) -> Result<Self, CardError> {
        match value {
            0 => Ok(Self::Active),
            1 => Ok(Self::Suspended),
            2 => Ok(Self::Buried),
            other => Err(CardError::UnknownQueue(other)),
        }
    }

    #[must_use]
    pub fn is_hidden(self) -> bool {
        !matches!(self, CardQueue::Active)
    }
}

//
// ─── CARD ──────────────────────────────────────────────────────────────────────
//

/// Scheduling view of a flashcard.
///
/// Content (prompt/answer) is owned by the authoring layer; this type only
/// carries what the study scheduler and the review path need.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    id: CardId,
    deck_id: DeckId,
    queue: CardQueue,
    state: CardState,
    due: DateTime<Utc>,
    scheduled_days: u32,
    reps: u32,
    lapses: u32,
    last_review: Option<DateTime<Utc>>,
    memory: Option<MemoryState>,
}

impl Card {
    /// Creates a brand-new card. New cards are ordered by `due`, so `due`
    /// doubles as their position in the new queue.
    #[must_use]
    pub fn new(id: CardId, deck_id: DeckId, due: DateTime<Utc>) -> Self {
        Self {
            id,
            deck_id,
            queue: CardQueue::Active,
            state: CardState::New,
            due,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            last_review: None,
            memory: None,
        }
    }

    /// Rebuilds a card from storage.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidPersistedState` when a reviewed card has no
    /// memory state or a new card claims review history.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: CardId,
        deck_id: DeckId,
        queue: CardQueue,
        state: CardState,
        due: DateTime<Utc>,
        scheduled_days: u32,
        reps: u32,
        lapses: u32,
        last_review: Option<DateTime<Utc>>,
        memory: Option<MemoryState>,
    ) -> Result<Self, CardError> {
        if state == CardState::New && (reps > 0 || last_review.is_some()) {
            return Err(CardError::InvalidPersistedState(
                "new card with review history".into(),
            ));
        }
        if state != CardState::New && memory.is_none() {
            return Err(CardError::InvalidPersistedState(
                "missing memory state".into(),
            ));
        }

        Ok(Self {
            id,
            deck_id,
            queue,
            state,
            due,
            scheduled_days,
            reps,
            lapses,
            last_review,
            memory,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    #[must_use]
    pub fn queue(&self) -> CardQueue {
        self.queue
    }

    #[must_use]
    pub fn state(&self) -> CardState {
        self.state
    }

    #[must_use]
    pub fn due(&self) -> DateTime<Utc> {
        self.due
    }

    #[must_use]
    pub fn scheduled_days(&self) -> u32 {
        self.scheduled_days
    }

    #[must_use]
    pub fn reps(&self) -> u32 {
        self.reps
    }

    #[must_use]
    pub fn lapses(&self) -> u32 {
        self.lapses
    }

    #[must_use]
    pub fn last_review(&self) -> Option<DateTime<Utc>> {
        self.last_review
    }

    #[must_use]
    pub fn memory_state(&self) -> Option<MemoryState> {
        self.memory.clone()
    }

    /// True while the card is stepping through same-day learning intervals.
    #[must_use]
    pub fn in_short_term_learning(&self) -> bool {
        self.state.is_learning() && self.scheduled_days == 0
    }

    pub fn suspend(&mut self) {
        self.queue = CardQueue::Suspended;
    }

    pub fn bury(&mut self) {
        self.queue = CardQueue::Buried;
    }

    /// Returns a suspended or buried card to the active queue.
    pub fn restore(&mut self) {
        self.queue = CardQueue::Active;
    }

    /// Applies a graded review.
    ///
    /// - `Again` sends the card into (re)learning one step away.
    /// - `Hard` on a new or learning card keeps it in learning.
    /// - Anything else graduates the card to review with the spacing interval.
    pub fn apply_review(
        &mut self,
        grade: ReviewGrade,
        outcome: &ReviewOutcome,
        reviewed_at: DateTime<Utc>,
    ) {
        let before = self.state;
        match grade {
            ReviewGrade::Again => {
                self.state = match before {
                    CardState::New | CardState::Learning => CardState::Learning,
                    CardState::Review | CardState::Relearning => CardState::Relearning,
                };
                if before == CardState::Review {
                    self.lapses += 1;
                }
                self.scheduled_days = 0;
                self.due = reviewed_at + AGAIN_STEP;
            }
            ReviewGrade::Hard if matches!(before, CardState::New | CardState::Learning) => {
                self.state = CardState::Learning;
                self.scheduled_days = 0;
                self.due = reviewed_at + HARD_STEP;
            }
            _ => {
                self.state = CardState::Review;
                self.scheduled_days = outcome.scheduled_days;
                self.due = outcome.next_review;
            }
        }

        self.reps += 1;
        self.last_review = Some(reviewed_at);
        self.memory = Some(MemoryState::from_outcome(outcome));
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
