//! Daily quota accounting from persisted per-deck counters.

use chrono::{DateTime, Utc};

use crate::day::DayBoundary;
use crate::model::{Deck, StudyConf};

/// Read-only view over the decks of a study session and their shared conf.
///
/// Counters of a deck whose `today` is not the current logical day are
/// treated as zero; nothing here resets them.
#[derive(Debug, Clone, Copy)]
pub struct QuotaTracker<'a> {
    main: &'a Deck,
    decks: &'a [Deck],
    conf: &'a StudyConf,
    boundary: &'a DayBoundary,
}

impl<'a> QuotaTracker<'a> {
    #[must_use]
    pub fn new(
        main: &'a Deck,
        decks: &'a [Deck],
        conf: &'a StudyConf,
        boundary: &'a DayBoundary,
    ) -> Self {
        Self {
            main,
            decks,
            conf,
            boundary,
        }
    }

    /// New cards already introduced today across the deck set.
    #[must_use]
    pub fn new_cards_seen_today(&self, now: DateTime<Utc>) -> u32 {
        self.sum_current(now, |d| d.new_today().len())
    }

    /// Distinct review cards answered today across the deck set.
    #[must_use]
    pub fn reviews_today(&self, now: DateTime<Utc>) -> u32 {
        self.sum_current(now, |d| d.revcards_today().len())
    }

    /// New cards that may still be shown today, bounded by `new_bucket_size`.
    ///
    /// When the main deck's counters are stale they are about to reset, so only
    /// the conf's cap applies (a custom limit belongs to the stale day).
    #[must_use]
    pub fn new_cards_left(&self, now: DateTime<Utc>, new_bucket_size: usize) -> u32 {
        let available = u32::try_from(new_bucket_size).unwrap_or(u32::MAX);
        if !self.main.counters_current(self.boundary, now) {
            return available.min(self.conf.new_per_day());
        }

        let limit = self
            .main
            .custom_newcard_limit()
            .unwrap_or(self.conf.new_per_day());
        let seen = self.new_cards_seen_today(now);
        available.min(limit.saturating_sub(seen))
    }

    /// Cheap lower-bound of what is left today: new allowance plus every
    /// gathered learning and review card. Not capped by `review_per_day`.
    #[must_use]
    pub fn estimated_reviews_left(
        &self,
        now: DateTime<Utc>,
        new_bucket_size: usize,
        learning_len: usize,
        review_len: usize,
    ) -> u32 {
        let rest = u32::try_from(learning_len.saturating_add(review_len)).unwrap_or(u32::MAX);
        self.new_cards_left(now, new_bucket_size).saturating_add(rest)
    }

    fn sum_current(&self, now: DateTime<Utc>, count: impl Fn(&Deck) -> usize) -> u32 {
        let total: usize = self
            .decks
            .iter()
            .filter(|d| d.counters_current(self.boundary, now))
            .map(count)
            .sum();
        u32::try_from(total).unwrap_or(u32::MAX)
    }
}

/// Done/left counts feeding the new-versus-review interleaving decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DailyProgress {
    pub new_done: u32,
    pub new_left: u32,
    pub reviews_done: u32,
    pub reviews_left: u32,
}

impl DailyProgress {
    #[must_use]
    pub fn new_total(&self) -> u64 {
        u64::from(self.new_done) + u64::from(self.new_left)
    }

    #[must_use]
    pub fn reviews_total(&self) -> u64 {
        u64::from(self.reviews_done) + u64::from(self.reviews_left)
    }

    /// True while the share of new cards left is at least the share of
    /// reviews left.
    ///
    /// Compared by cross-multiplication: nothing left to introduce never
    /// prefers new cards, and an empty review total counts as a zero share.
    #[must_use]
    pub fn prefers_new(&self) -> bool {
        if self.new_left == 0 {
            return false;
        }
        u64::from(self.new_left) * self.reviews_total()
            >= u64::from(self.reviews_left) * self.new_total()
    }
}
