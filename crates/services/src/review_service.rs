use chrono::{DateTime, Utc};

use study_core::{
    day::DayBoundary,
    model::{Card, CardState, Deck, ReviewGrade, ReviewLog, ReviewOutcome},
    spacing::{Spacing, elapsed_days},
    time::Clock,
};
use study_storage::repository::ReviewPersistence;

use crate::error::ReviewServiceError;

//
// ─── GRADED CARD ───────────────────────────────────────────────────────────────
//

/// A card state change and the log entry describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedCard {
    pub outcome: ReviewOutcome,
    pub log: ReviewLog,
    /// True when this was the card's first answer.
    pub was_new: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Grades cards with FSRS and commits the result with the deck's daily
/// counters.
pub struct ReviewService {
    clock: Clock,
    spacing: Spacing,
}

impl ReviewService {
    /// FSRS at the default retention and the system clock.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Spacing` if FSRS fails to initialize.
    pub fn new() -> Result<Self, ReviewServiceError> {
        Ok(Self {
            clock: Clock::default(),
            spacing: Spacing::new()?,
        })
    }

    #[must_use]
    pub fn with_spacing(spacing: Spacing) -> Self {
        Self {
            clock: Clock::default(),
            spacing,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Applies `grade` to an in-memory card without touching the store.
    ///
    /// # Errors
    ///
    /// Returns `SpacingError::InvalidElapsedDays` when `reviewed_at` is
    /// before the card's last review, and FSRS failures.
    pub fn grade(
        &self,
        card: &mut Card,
        grade: ReviewGrade,
        reviewed_at: DateTime<Utc>,
    ) -> Result<GradedCard, ReviewServiceError> {
        let before = card.state();
        let elapsed = elapsed_days(card.last_review(), reviewed_at);
        let memory = card.memory_state();
        let outcome = self
            .spacing
            .outcome(memory.as_ref(), grade, reviewed_at, elapsed)?;

        card.apply_review(grade, &outcome, reviewed_at);

        let log = ReviewLog::new(
            card.id(),
            card.deck_id(),
            grade,
            before,
            reviewed_at,
            &outcome,
            card.scheduled_days(),
            card.due(),
        );

        Ok(GradedCard {
            outcome,
            log,
            was_new: before == CardState::New,
        })
    }

    /// Grades `card`, records the answer in `deck`'s counters and commits
    /// card, deck and log together.
    ///
    /// `deck` must be the card's own deck. Both values are restored when the
    /// commit fails.
    ///
    /// # Errors
    ///
    /// Returns spacing errors before anything is written, and storage errors
    /// from the commit.
    pub async fn answer(
        &self,
        card: &mut Card,
        deck: &mut Deck,
        grade: ReviewGrade,
        reviewed_at: DateTime<Utc>,
        boundary: &DayBoundary,
        reviews: &dyn ReviewPersistence,
    ) -> Result<GradedCard, ReviewServiceError> {
        let original_card = card.clone();
        let original_deck = deck.clone();

        let graded = self.grade(card, grade, reviewed_at)?;
        deck.record_review(boundary, reviewed_at, card.id(), graded.was_new, graded.log.id);

        if let Err(err) = reviews.commit_review(card, deck, &graded.log).await {
            tracing::warn!(card_id = %card.id(), error = %err, "review commit failed");
            *card = original_card;
            *deck = original_deck;
            return Err(err.into());
        }

        tracing::debug!(
            card_id = %card.id(),
            grade = ?grade,
            state = card.state().as_str(),
            due = %card.due(),
            "review answered"
        );
        Ok(graded)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use study_core::model::{AGAIN_STEP, CardId, ConfId, DeckId};
    use study_core::spacing::SpacingError;
    use study_core::time::fixed_now;
    use study_storage::repository::{
        CardRepository, DeckRepository, InMemoryRepository, ReviewLogRepository,
    };

    fn build_deck() -> Deck {
        Deck::new(DeckId::new(1), "Test", None, ConfId::new(1)).unwrap()
    }

    fn build_card() -> Card {
        Card::new(CardId::new(1), DeckId::new(1), fixed_now())
    }

    fn service() -> ReviewService {
        ReviewService::new()
            .unwrap()
            .with_clock(Clock::fixed(fixed_now()))
    }

    #[test]
    fn grading_new_card_moves_it_to_review() {
        let mut card = build_card();
        let service = service();
        let graded = service
            .grade(&mut card, ReviewGrade::Good, service.now())
            .unwrap();

        assert!(graded.was_new);
        assert_eq!(graded.log.state, CardState::New);
        assert_eq!(graded.log.id, fixed_now().timestamp_millis());
        assert_eq!(card.state(), CardState::Review);
        assert_eq!(card.reps(), 1);
        assert!(card.due() >= fixed_now() + Duration::days(1));
    }

    #[test]
    fn again_keeps_card_in_learning_one_step_away() {
        let mut card = build_card();
        let graded = service()
            .grade(&mut card, ReviewGrade::Again, fixed_now())
            .unwrap();

        assert_eq!(card.state(), CardState::Learning);
        assert!(card.in_short_term_learning());
        assert_eq!(card.due(), fixed_now() + AGAIN_STEP);
        assert_eq!(graded.log.due, card.due());
    }

    #[test]
    fn backdated_review_is_rejected() {
        let mut card = build_card();
        let service = service();
        service
            .grade(&mut card, ReviewGrade::Good, fixed_now())
            .unwrap();

        let err = service
            .grade(&mut card, ReviewGrade::Good, fixed_now() - Duration::days(1))
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewServiceError::Spacing(SpacingError::InvalidElapsedDays { .. })
        ));
    }

    #[tokio::test]
    async fn answer_commits_card_deck_and_log() {
        let repo = InMemoryRepository::new();
        let mut deck = build_deck();
        let mut card = build_card();
        repo.upsert_deck(&deck).await.unwrap();
        repo.upsert_card(&card).await.unwrap();

        let graded = service()
            .answer(
                &mut card,
                &mut deck,
                ReviewGrade::Good,
                fixed_now(),
                &DayBoundary::default(),
                &repo,
            )
            .await
            .unwrap();

        let stored = repo.get_deck(deck.id()).await.unwrap().unwrap();
        assert_eq!(stored.new_today(), &[card.id()]);
        assert_eq!(stored.revlogs_today(), &[graded.log.id]);
        assert_eq!(repo.get_card(card.id()).await.unwrap().unwrap(), card);
        assert_eq!(repo.logs_for_card(card.id()).await.unwrap(), vec![graded.log]);
    }

    #[tokio::test]
    async fn answer_resets_stale_counters_first() {
        let repo = InMemoryRepository::new();
        let boundary = DayBoundary::default();
        let mut deck = build_deck();
        let yesterday = fixed_now() - Duration::days(1);
        deck.record_review(&boundary, yesterday, CardId::new(7), true, 1);
        deck.set_custom_newcard_limit(Some(50));

        let mut card = build_card();
        service()
            .answer(&mut card, &mut deck, ReviewGrade::Hard, fixed_now(), &boundary, &repo)
            .await
            .unwrap();

        assert_eq!(deck.new_today(), &[card.id()]);
        assert_eq!(deck.revlogs_today().len(), 1);
        assert_eq!(deck.custom_newcard_limit(), None);
        assert!(deck.counters_current(&boundary, fixed_now()));
    }

    #[tokio::test]
    async fn failed_commit_restores_card_and_deck() {
        let repo = InMemoryRepository::new();
        let boundary = DayBoundary::default();
        let mut deck = build_deck();
        let mut card = build_card();
        let service = service();
        service
            .answer(&mut card, &mut deck, ReviewGrade::Again, fixed_now(), &boundary, &repo)
            .await
            .unwrap();

        // Same millisecond: the log id collides.
        let card_before = card.clone();
        let deck_before = deck.clone();
        let err = service
            .answer(&mut card, &mut deck, ReviewGrade::Good, fixed_now(), &boundary, &repo)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewServiceError::Storage(_)));
        assert_eq!(card, card_before);
        assert_eq!(deck, deck_before);
    }
}
