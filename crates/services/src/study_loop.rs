use chrono::{DateTime, Utc};

use study_core::buckets::BucketKind;
use study_core::model::{Card, ReviewGrade};
use study_core::selector::DueCard;
use study_storage::repository::Storage;

use crate::error::{SchedulerError, StudyError};
use crate::review_service::{GradedCard, ReviewService};
use crate::scheduler::StudyScheduler;

/// Result of answering one presented card.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyAnswer {
    pub card: Card,
    pub graded: GradedCard,
    /// Bucket the card was put back into, when it is due again today.
    pub requeued: Option<BucketKind>,
}

/// Presents cards from a scheduler and commits answers through the review
/// service.
pub struct StudyLoop {
    scheduler: StudyScheduler,
    reviews: ReviewService,
    storage: Storage,
}

impl StudyLoop {
    #[must_use]
    pub fn new(scheduler: StudyScheduler, reviews: ReviewService, storage: Storage) -> Self {
        Self {
            scheduler,
            reviews,
            storage,
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &StudyScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut StudyScheduler {
        &mut self.scheduler
    }

    /// Next card to show, if any.
    ///
    /// # Errors
    ///
    /// Propagates scheduler errors.
    pub async fn next(&mut self, now: DateTime<Utc>) -> Result<Option<DueCard>, StudyError> {
        Ok(self.scheduler.next_card(now).await?)
    }

    /// Grades the selected card, commits it, and updates the buckets.
    ///
    /// The card always leaves the bucket it was drawn from. Cards still in
    /// same-day learning go back into the learning bucket.
    ///
    /// # Errors
    ///
    /// `CardMissing` when the card was deleted since it was gathered (it is
    /// dropped from the buckets), `DeckNotFound` for a missing deck row, and
    /// review or storage errors from the commit.
    pub async fn answer(
        &mut self,
        due: &DueCard,
        grade: ReviewGrade,
        now: DateTime<Utc>,
    ) -> Result<StudyAnswer, StudyError> {
        let Some(mut card) = self.scheduler.resolve(due).await? else {
            self.scheduler.remove(due);
            return Err(StudyError::CardMissing(due.card.id));
        };
        let mut deck = self
            .storage
            .decks
            .get_deck(card.deck_id())
            .await?
            .ok_or(SchedulerError::DeckNotFound(card.deck_id()))?;

        let graded = self
            .reviews
            .answer(
                &mut card,
                &mut deck,
                grade,
                now,
                self.scheduler.boundary(),
                self.storage.reviews.as_ref(),
            )
            .await?;

        self.scheduler.remove(due);
        let requeued = if card.in_short_term_learning() {
            self.scheduler.reinsert(&card, now)
        } else {
            None
        };

        Ok(StudyAnswer {
            card,
            graded,
            requeued,
        })
    }
}
