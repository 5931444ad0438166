use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use study_core::model::{Card, CardId, ConfId, Deck, DeckId, Prefs, ReviewLog, StudyConf};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for decks.
#[async_trait]
pub trait DeckRepository: Send + Sync {
    /// Persist or update a deck, counters included.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the deck cannot be stored.
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError>;

    /// Fetch a deck by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError>;

    /// Fetch several decks, in the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing.
    async fn get_decks(&self, ids: &[DeckId]) -> Result<Vec<Deck>, StorageError>;

    /// All decks ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError>;
}

#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Persist or update a card.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the card cannot be stored.
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError>;

    /// Fetch a card by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError>;

    /// Every card belonging to any of `deck_ids`, ordered by card id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn cards_in_decks(&self, deck_ids: &[DeckId]) -> Result<Vec<Card>, StorageError>;
}

/// Shared study configurations.
#[async_trait]
pub trait ConfRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the conf cannot be stored.
    async fn upsert_conf(&self, conf: &StudyConf) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_conf(&self, id: ConfId) -> Result<Option<StudyConf>, StorageError>;
}

/// The single global preferences row.
#[async_trait]
pub trait PrefsRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_prefs(&self) -> Result<Option<Prefs>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn save_prefs(&self, prefs: &Prefs) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ReviewLogRepository: Send + Sync {
    /// Review history of one card, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn logs_for_card(&self, card_id: CardId) -> Result<Vec<ReviewLog>, StorageError>;
}

/// Atomic write of one answered review.
#[async_trait]
pub trait ReviewPersistence: Send + Sync {
    /// Stores the updated card, the updated deck counters and the log entry in
    /// a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the log does not match the card and
    /// deck or its id is already taken, and other storage errors on failure.
    async fn commit_review(
        &self,
        card: &Card,
        deck: &Deck,
        log: &ReviewLog,
    ) -> Result<(), StorageError>;
}

pub(crate) fn check_review_matches(
    card: &Card,
    deck: &Deck,
    log: &ReviewLog,
) -> Result<(), StorageError> {
    if log.card_id != card.id() || log.deck_id != card.deck_id() || deck.id() != card.deck_id() {
        return Err(StorageError::Conflict);
    }
    Ok(())
}

#[derive(Default)]
struct Tables {
    decks: BTreeMap<DeckId, Deck>,
    cards: BTreeMap<CardId, Card>,
    confs: HashMap<ConfId, StudyConf>,
    prefs: Option<Prefs>,
    logs: BTreeMap<i64, ReviewLog>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// One lock guards every table so `commit_review` is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl DeckRepository for InMemoryRepository {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        self.lock()?.decks.insert(deck.id(), deck.clone());
        Ok(())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError> {
        Ok(self.lock()?.decks.get(&id).cloned())
    }

    async fn get_decks(&self, ids: &[DeckId]) -> Result<Vec<Deck>, StorageError> {
        let guard = self.lock()?;
        ids.iter()
            .map(|id| guard.decks.get(id).cloned().ok_or(StorageError::NotFound))
            .collect()
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError> {
        Ok(self.lock()?.decks.values().cloned().collect())
    }
}

#[async_trait]
impl CardRepository for InMemoryRepository {
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError> {
        self.lock()?.cards.insert(card.id(), card.clone());
        Ok(())
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError> {
        Ok(self.lock()?.cards.get(&id).cloned())
    }

    async fn cards_in_decks(&self, deck_ids: &[DeckId]) -> Result<Vec<Card>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .cards
            .values()
            .filter(|c| deck_ids.contains(&c.deck_id()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConfRepository for InMemoryRepository {
    async fn upsert_conf(&self, conf: &StudyConf) -> Result<(), StorageError> {
        self.lock()?.confs.insert(conf.id(), conf.clone());
        Ok(())
    }

    async fn get_conf(&self, id: ConfId) -> Result<Option<StudyConf>, StorageError> {
        Ok(self.lock()?.confs.get(&id).cloned())
    }
}

#[async_trait]
impl PrefsRepository for InMemoryRepository {
    async fn get_prefs(&self) -> Result<Option<Prefs>, StorageError> {
        Ok(self.lock()?.prefs.clone())
    }

    async fn save_prefs(&self, prefs: &Prefs) -> Result<(), StorageError> {
        self.lock()?.prefs = Some(prefs.clone());
        Ok(())
    }
}

#[async_trait]
impl ReviewLogRepository for InMemoryRepository {
    async fn logs_for_card(&self, card_id: CardId) -> Result<Vec<ReviewLog>, StorageError> {
        let guard = self.lock()?;
        let mut logs: Vec<ReviewLog> = guard
            .logs
            .values()
            .filter(|l| l.card_id == card_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.reviewed_at);
        Ok(logs)
    }
}

#[async_trait]
impl ReviewPersistence for InMemoryRepository {
    async fn commit_review(
        &self,
        card: &Card,
        deck: &Deck,
        log: &ReviewLog,
    ) -> Result<(), StorageError> {
        check_review_matches(card, deck, log)?;
        let mut guard = self.lock()?;
        if guard.logs.contains_key(&log.id) {
            return Err(StorageError::Conflict);
        }
        guard.cards.insert(card.id(), card.clone());
        guard.decks.insert(deck.id(), deck.clone());
        guard.logs.insert(log.id, log.clone());
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub decks: Arc<dyn DeckRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub confs: Arc<dyn ConfRepository>,
    pub prefs: Arc<dyn PrefsRepository>,
    pub review_logs: Arc<dyn ReviewLogRepository>,
    pub reviews: Arc<dyn ReviewPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Uses one repository value for every role.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: DeckRepository
            + CardRepository
            + ConfRepository
            + PrefsRepository
            + ReviewLogRepository
            + ReviewPersistence
            + Clone
            + 'static,
    {
        Self {
            decks: Arc::new(repo.clone()),
            cards: Arc::new(repo.clone()),
            confs: Arc::new(repo.clone()),
            prefs: Arc::new(repo.clone()),
            review_logs: Arc::new(repo.clone()),
            reviews: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use study_core::model::{CardState, ReviewGrade, ReviewOutcome};
    use study_core::time::fixed_now;
    use study_core::DayBoundary;

    fn build_deck(id: u64) -> Deck {
        Deck::new(DeckId::new(id), format!("Deck {id}"), None, ConfId::new(1)).unwrap()
    }

    fn answered(card: &mut Card, deck: &mut Deck) -> ReviewLog {
        let now = fixed_now();
        let outcome = ReviewOutcome::new(now + Duration::days(2), 2.0, 5.0, 0.0, 2);
        let before = card.state();
        card.apply_review(ReviewGrade::Good, &outcome, now);
        let log = ReviewLog::new(
            card.id(),
            card.deck_id(),
            ReviewGrade::Good,
            before,
            now,
            &outcome,
            card.scheduled_days(),
            card.due(),
        );
        deck.record_review(&DayBoundary::default(), now, card.id(), true, log.id);
        log
    }

    #[tokio::test]
    async fn cards_in_decks_filters_by_deck() {
        let repo = InMemoryRepository::new();
        for (id, deck) in [(1, 1), (2, 2), (3, 1), (4, 3)] {
            repo.upsert_card(&Card::new(CardId::new(id), DeckId::new(deck), fixed_now()))
                .await
                .unwrap();
        }

        let cards = repo
            .cards_in_decks(&[DeckId::new(1), DeckId::new(3)])
            .await
            .unwrap();
        let ids: Vec<u64> = cards.iter().map(|c| c.id().value()).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn get_decks_fails_on_missing_id() {
        let repo = InMemoryRepository::new();
        repo.upsert_deck(&build_deck(1)).await.unwrap();
        let err = repo
            .get_decks(&[DeckId::new(1), DeckId::new(2)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn commit_review_writes_card_deck_and_log() {
        let repo = InMemoryRepository::new();
        let mut deck = build_deck(1);
        let mut card = Card::new(CardId::new(1), deck.id(), fixed_now());
        repo.upsert_deck(&deck).await.unwrap();
        repo.upsert_card(&card).await.unwrap();

        let log = answered(&mut card, &mut deck);
        repo.commit_review(&card, &deck, &log).await.unwrap();

        let stored = repo.get_card(card.id()).await.unwrap().unwrap();
        assert_eq!(stored.state(), CardState::Review);
        let stored_deck = repo.get_deck(deck.id()).await.unwrap().unwrap();
        assert_eq!(stored_deck.new_today(), &[card.id()]);
        assert_eq!(repo.logs_for_card(card.id()).await.unwrap().len(), 1);

        let err = repo.commit_review(&card, &deck, &log).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn commit_review_rejects_mismatched_deck() {
        let repo = InMemoryRepository::new();
        let mut deck = build_deck(1);
        let mut card = Card::new(CardId::new(1), deck.id(), fixed_now());
        let log = answered(&mut card, &mut deck);

        let other = build_deck(2);
        let err = repo.commit_review(&card, &other, &log).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert!(repo.get_card(card.id()).await.unwrap().is_none());
    }
}
