use chrono::{DateTime, Duration, Utc};

use study_core::buckets::{BucketKind, Buckets, CardRef};
use study_core::day::DayBoundary;
use study_core::model::{Card, Deck, DeckId, Prefs, StudyConf, deck_with_descendants};
use study_core::quota::{DailyProgress, QuotaTracker};
use study_core::selector::{CardSelector, DueCard, RandomSource, ThreadRandom};
use study_storage::repository::{Storage, StorageError};

use crate::error::SchedulerError;

//
// ─── STUDY SCHEDULER ───────────────────────────────────────────────────────────
//

/// Orchestrates one study session over a main deck and the decks studied
/// with it.
///
/// Buckets are gathered once per logical day. Every call that selects or
/// estimates first checks `last_gather` and re-gathers on rollover; answered
/// cards are only observed on the next gather unless the caller removes or
/// reinserts them explicitly.
pub struct StudyScheduler {
    main_deck_id: DeckId,
    deck_ids: Vec<DeckId>,
    conf: StudyConf,
    boundary: DayBoundary,
    collapse: Duration,
    storage: Storage,
    buckets: Buckets,
    last_gather: Option<DateTime<Utc>>,
    rng: Box<dyn RandomSource + Send>,
}

impl StudyScheduler {
    /// Builds a scheduler and performs the initial gather.
    ///
    /// `deck_ids` is the full deck set; the main deck is moved to the front
    /// (and added if absent).
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NoDecks` when `deck_ids` is empty,
    /// `SchedulerError::DeckNotFound` when the main deck or a listed deck has
    /// no row, and storage errors from the initial gather.
    pub async fn new(
        main_deck_id: DeckId,
        deck_ids: Vec<DeckId>,
        conf: StudyConf,
        prefs: &Prefs,
        storage: &Storage,
        now: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        if deck_ids.is_empty() {
            return Err(SchedulerError::NoDecks);
        }

        let mut ordered = Vec::with_capacity(deck_ids.len() + 1);
        ordered.push(main_deck_id);
        ordered.extend(deck_ids.into_iter().filter(|id| *id != main_deck_id));

        let mut scheduler = Self {
            main_deck_id,
            deck_ids: ordered,
            collapse: conf.collapse_window(prefs),
            conf,
            boundary: prefs.boundary(),
            storage: storage.clone(),
            buckets: Buckets::default(),
            last_gather: None,
            rng: Box::new(ThreadRandom),
        };
        scheduler.load_decks().await?;
        scheduler.regather(now).await?;

        tracing::info!(
            main_deck = %main_deck_id,
            decks = scheduler.deck_ids.len(),
            "study scheduler ready"
        );
        Ok(scheduler)
    }

    /// Loads the deck, its descendants, its conf and the global prefs, then
    /// builds a scheduler over them.
    ///
    /// # Errors
    ///
    /// `DeckNotFound`, `ConfNotFound` or `PrefsNotFound` when a row is
    /// missing; storage errors otherwise.
    pub async fn for_deck(
        deck_id: DeckId,
        storage: &Storage,
        now: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        let main = storage
            .decks
            .get_deck(deck_id)
            .await?
            .ok_or(SchedulerError::DeckNotFound(deck_id))?;
        let all = storage.decks.list_decks().await?;
        let deck_ids = deck_with_descendants(&all, deck_id);

        let conf = storage
            .confs
            .get_conf(main.conf_id())
            .await?
            .ok_or(SchedulerError::ConfNotFound(main.conf_id()))?;
        let prefs = storage
            .prefs
            .get_prefs()
            .await?
            .ok_or(SchedulerError::PrefsNotFound)?;

        Self::new(deck_id, deck_ids, conf, &prefs, storage, now).await
    }

    /// Replaces the randomness source used for review and random new picks.
    #[must_use]
    pub fn with_random(mut self, source: impl RandomSource + Send + 'static) -> Self {
        self.rng = Box::new(source);
        self
    }

    // Accessors
    #[must_use]
    pub fn main_deck_id(&self) -> DeckId {
        self.main_deck_id
    }

    #[must_use]
    pub fn deck_ids(&self) -> &[DeckId] {
        &self.deck_ids
    }

    #[must_use]
    pub fn conf(&self) -> &StudyConf {
        &self.conf
    }

    #[must_use]
    pub fn boundary(&self) -> &DayBoundary {
        &self.boundary
    }

    #[must_use]
    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    /// Start of the logical day the buckets were gathered for.
    #[must_use]
    pub fn last_gather(&self) -> Option<DateTime<Utc>> {
        self.last_gather
    }

    //
    // ─── GATHERING ─────────────────────────────────────────────────────────────
    //

    /// Re-gathers the buckets when `now` falls in a different logical day
    /// than the last gather. Returns whether a gather happened.
    ///
    /// # Errors
    ///
    /// Returns storage errors from reading the deck set's cards. The previous
    /// buckets are kept on failure.
    pub async fn regather(&mut self, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let today = self.boundary.start_of_day(now);
        if self.last_gather == Some(today) {
            return Ok(false);
        }

        let cards = self.storage.cards.cards_in_decks(&self.deck_ids).await?;
        self.buckets = Buckets::gather(&cards, &self.boundary, now);
        self.last_gather = Some(today);

        tracing::debug!(
            day = %today,
            new = self.buckets.new_cards().len(),
            learning = self.buckets.learning().len(),
            review = self.buckets.review().len(),
            "gathered study buckets"
        );
        Ok(true)
    }

    //
    // ─── SELECTION ─────────────────────────────────────────────────────────────
    //

    /// Next card to present, or `None` when nothing is available right now.
    ///
    /// # Errors
    ///
    /// Returns storage errors from re-gathering or reading deck counters.
    pub async fn next_card(&mut self, now: DateTime<Utc>) -> Result<Option<DueCard>, SchedulerError> {
        self.regather(now).await?;
        let progress = self.progress(now).await?;

        let mut selector = CardSelector::new(&self.buckets, self.rng.as_mut());
        let picked = selector.next_card(now, &progress, self.conf.new_pick_at_random(), self.collapse);

        if let Some(due) = &picked {
            tracing::debug!(card_id = %due.card.id, bucket = ?due.bucket, "selected card");
        }
        Ok(picked)
    }

    /// New cards left plus every gathered learning and review card.
    ///
    /// # Errors
    ///
    /// Returns storage errors from re-gathering or reading deck counters.
    pub async fn estimated_reviews_left(&mut self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        self.regather(now).await?;
        let (main, decks) = self.load_decks().await?;
        let tracker = self.tracker(&main, &decks);
        Ok(tracker.estimated_reviews_left(
            now,
            self.buckets.new_cards().len(),
            self.buckets.learning().len(),
            self.buckets.review().len(),
        ))
    }

    /// New cards that may still be introduced today.
    ///
    /// # Errors
    ///
    /// Returns storage errors from re-gathering or reading deck counters.
    pub async fn new_cards_left(&mut self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        self.regather(now).await?;
        let (main, decks) = self.load_decks().await?;
        Ok(self.tracker(&main, &decks).new_cards_left(now, self.buckets.new_cards().len()))
    }

    /// Distinct review cards answered today across the deck set.
    ///
    /// # Errors
    ///
    /// Returns storage errors from reading deck counters.
    pub async fn reviews_today(&self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        let (main, decks) = self.load_decks().await?;
        Ok(self.tracker(&main, &decks).reviews_today(now))
    }

    /// New cards introduced today across the deck set.
    ///
    /// # Errors
    ///
    /// Returns storage errors from reading deck counters.
    pub async fn new_cards_seen_today(&self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        let (main, decks) = self.load_decks().await?;
        Ok(self.tracker(&main, &decks).new_cards_seen_today(now))
    }

    //
    // ─── BUCKET MAINTENANCE ────────────────────────────────────────────────────
    //

    /// Drops a selected card from its bucket.
    ///
    /// Uses the recorded index when it still points at the card, otherwise
    /// looks the card up by id.
    pub fn remove(&mut self, due: &DueCard) -> Option<CardRef> {
        let at_index = self
            .buckets
            .get(due.bucket)
            .get(due.index)
            .is_some_and(|c| c.id == due.card.id);
        if at_index {
            return self.buckets.remove(due.bucket, due.index);
        }
        self.buckets.forget(due.card.id).map(|(_, card)| card)
    }

    /// Puts an answered card back into today's buckets if it still belongs
    /// there, typically a card stepping through learning.
    pub fn reinsert(&mut self, card: &Card, now: DateTime<Utc>) -> Option<BucketKind> {
        if !self.deck_ids.contains(&card.deck_id()) {
            return None;
        }
        self.buckets.place(card, &self.boundary, now)
    }

    /// Loads the full card behind a selection.
    ///
    /// # Errors
    ///
    /// Returns storage errors on backend failure.
    pub async fn resolve(&self, due: &DueCard) -> Result<Option<Card>, SchedulerError> {
        Ok(self.storage.cards.get_card(due.card.id).await?)
    }

    //
    // ─── QUOTAS ────────────────────────────────────────────────────────────────
    //

    async fn progress(&self, now: DateTime<Utc>) -> Result<DailyProgress, SchedulerError> {
        let (main, decks) = self.load_decks().await?;
        let tracker = self.tracker(&main, &decks);
        let reviews_left = self
            .buckets
            .learning()
            .len()
            .saturating_add(self.buckets.review().len());

        Ok(DailyProgress {
            new_done: tracker.new_cards_seen_today(now),
            new_left: tracker.new_cards_left(now, self.buckets.new_cards().len()),
            reviews_done: tracker.reviews_today(now),
            reviews_left: u32::try_from(reviews_left).unwrap_or(u32::MAX),
        })
    }

    /// Fresh deck rows: the main deck, and the whole set with main first.
    async fn load_decks(&self) -> Result<(Deck, Vec<Deck>), SchedulerError> {
        let main = self
            .storage
            .decks
            .get_deck(self.main_deck_id)
            .await?
            .ok_or(SchedulerError::DeckNotFound(self.main_deck_id))?;
        let decks = fetch_decks(&self.storage, &self.deck_ids).await?;
        Ok((main, decks))
    }

    fn tracker<'a>(&'a self, main: &'a Deck, decks: &'a [Deck]) -> QuotaTracker<'a> {
        QuotaTracker::new(main, decks, &self.conf, &self.boundary)
    }
}

/// Reads `ids` in order, naming the first deck that has no row.
async fn fetch_decks(storage: &Storage, ids: &[DeckId]) -> Result<Vec<Deck>, SchedulerError> {
    match storage.decks.get_decks(ids).await {
        Ok(decks) => Ok(decks),
        Err(StorageError::NotFound) => {
            for &id in ids {
                if storage.decks.get_deck(id).await?.is_none() {
                    return Err(SchedulerError::DeckNotFound(id));
                }
            }
            Err(StorageError::NotFound.into())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::model::{CardId, ConfId};
    use study_core::selector::SequenceRandom;
    use study_core::time::fixed_now;

    async fn seeded(cards: &[Card]) -> Storage {
        let storage = Storage::in_memory();
        let deck = Deck::new(DeckId::new(1), "Main", None, ConfId::new(1)).unwrap();
        storage.decks.upsert_deck(&deck).await.unwrap();
        for card in cards {
            storage.cards.upsert_card(card).await.unwrap();
        }
        storage
    }

    fn new_card(id: u64, mins: i64) -> Card {
        Card::new(CardId::new(id), DeckId::new(1), fixed_now() + Duration::minutes(mins))
    }

    async fn scheduler(storage: &Storage) -> StudyScheduler {
        StudyScheduler::new(
            DeckId::new(1),
            vec![DeckId::new(1)],
            StudyConf::default_for(ConfId::new(1)),
            &Prefs::default(),
            storage,
            fixed_now(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn empty_deck_list_is_rejected() {
        let storage = Storage::in_memory();
        let err = StudyScheduler::new(
            DeckId::new(1),
            Vec::new(),
            StudyConf::default_for(ConfId::new(1)),
            &Prefs::default(),
            &storage,
            fixed_now(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, SchedulerError::NoDecks));
    }

    #[tokio::test]
    async fn main_deck_comes_first() {
        let storage = seeded(&[]).await;
        for id in [2, 3] {
            let deck = Deck::new(DeckId::new(id), format!("Child {id}"), None, ConfId::new(1)).unwrap();
            storage.decks.upsert_deck(&deck).await.unwrap();
        }
        let s = StudyScheduler::new(
            DeckId::new(1),
            vec![DeckId::new(3), DeckId::new(1), DeckId::new(2)],
            StudyConf::default_for(ConfId::new(1)),
            &Prefs::default(),
            &storage,
            fixed_now(),
        )
        .await
        .unwrap();
        assert_eq!(s.deck_ids(), &[DeckId::new(1), DeckId::new(3), DeckId::new(2)]);
    }

    #[tokio::test]
    async fn unknown_main_deck_fails_construction() {
        let storage = Storage::in_memory();
        let orphan = Card::new(CardId::new(1), DeckId::new(7), fixed_now());
        storage.cards.upsert_card(&orphan).await.unwrap();

        let err = StudyScheduler::new(
            DeckId::new(7),
            vec![DeckId::new(7)],
            StudyConf::default_for(ConfId::new(1)),
            &Prefs::default(),
            &storage,
            fixed_now(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, SchedulerError::DeckNotFound(id) if id == DeckId::new(7)));
    }

    #[tokio::test]
    async fn unknown_listed_deck_is_named() {
        let storage = seeded(&[new_card(1, 0)]).await;
        let err = StudyScheduler::new(
            DeckId::new(1),
            vec![DeckId::new(1), DeckId::new(4)],
            StudyConf::default_for(ConfId::new(1)),
            &Prefs::default(),
            &storage,
            fixed_now(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, SchedulerError::DeckNotFound(id) if id == DeckId::new(4)));
    }

    #[tokio::test]
    async fn initial_gather_sets_marker() {
        let storage = seeded(&[new_card(1, 0)]).await;
        let s = scheduler(&storage).await;
        assert_eq!(
            s.last_gather(),
            Some(Prefs::default().boundary().start_of_day(fixed_now()))
        );
        assert_eq!(s.buckets().new_cards().len(), 1);
    }

    #[tokio::test]
    async fn remove_falls_back_to_id_lookup() {
        let storage = seeded(&[new_card(1, 0), new_card(2, 5)]).await;
        let mut s = scheduler(&storage).await.with_random(SequenceRandom::default());

        let first = s.next_card(fixed_now()).await.unwrap().unwrap();
        let second = DueCard {
            card: s.buckets().new_cards()[1],
            bucket: BucketKind::New,
            index: 1,
        };
        assert!(s.remove(&first).is_some());
        // Index 1 is now out of range; the id still resolves.
        assert_eq!(s.remove(&second).map(|c| c.id), Some(CardId::new(2)));
        assert!(s.buckets().is_empty());
        assert!(s.remove(&second).is_none());
    }

    #[tokio::test]
    async fn reinsert_ignores_foreign_decks() {
        let storage = seeded(&[]).await;
        let mut s = scheduler(&storage).await;
        let foreign = Card::new(CardId::new(5), DeckId::new(9), fixed_now());
        assert_eq!(s.reinsert(&foreign, fixed_now()), None);
        assert_eq!(s.reinsert(&new_card(6, 0), fixed_now()), Some(BucketKind::New));
    }

    #[tokio::test]
    async fn resolve_reads_the_store() {
        let storage = seeded(&[new_card(1, 0)]).await;
        let mut s = scheduler(&storage).await;
        let due = s.next_card(fixed_now()).await.unwrap().unwrap();
        let card = s.resolve(&due).await.unwrap().unwrap();
        assert_eq!(card.id(), CardId::new(1));
    }
}
