//! Picking the next card to present.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::buckets::{BucketKind, Buckets, CardRef};
use crate::quota::DailyProgress;

//
// ─── RANDOMNESS ────────────────────────────────────────────────────────────────
//

/// Uniform index source used for random picks.
pub trait RandomSource {
    /// Returns an index in `0..len`. Only called with `len > 0`.
    fn pick(&mut self, len: usize) -> usize;
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Replays a fixed sequence of picks (each reduced modulo `len`), then
/// returns 0 once exhausted.
#[derive(Debug, Clone, Default)]
pub struct SequenceRandom {
    picks: VecDeque<usize>,
}

impl SequenceRandom {
    #[must_use]
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            picks: picks.into_iter().collect(),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.picks.pop_front().map_or(0, |p| p % len)
    }
}

//
// ─── DUE CARD ──────────────────────────────────────────────────────────────────
//

/// A selected card plus the bucket slot it came from.
///
/// Consumed right away by the caller; hand it back to the scheduler to
/// remove the card without rescanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueCard {
    pub card: CardRef,
    pub bucket: BucketKind,
    pub index: usize,
}

//
// ─── SELECTOR ──────────────────────────────────────────────────────────────────
//

/// Applies the picking rules over one snapshot of the buckets.
///
/// All picks are total: an empty source yields `None`.
pub struct CardSelector<'a, R: RandomSource + ?Sized> {
    buckets: &'a Buckets,
    rng: &'a mut R,
}

impl<'a, R: RandomSource + ?Sized> CardSelector<'a, R> {
    #[must_use]
    pub fn new(buckets: &'a Buckets, rng: &'a mut R) -> Self {
        Self { buckets, rng }
    }

    /// Uniform pick among learning cards due at or before `deadline`.
    pub fn pick_learning_before(&mut self, deadline: DateTime<Utc>) -> Option<DueCard> {
        let eligible: Vec<usize> = self
            .buckets
            .learning()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.due <= deadline)
            .map(|(i, _)| i)
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let index = eligible[self.rng.pick(eligible.len())];
        Some(self.due_card(BucketKind::Learning, index))
    }

    /// Uniform pick among review cards.
    pub fn pick_review(&mut self) -> Option<DueCard> {
        let len = self.buckets.review().len();
        if len == 0 {
            return None;
        }
        let index = self.rng.pick(len);
        Some(self.due_card(BucketKind::Review, index))
    }

    /// Earliest-due new card, or a uniform pick when `pick_at_random`.
    pub fn pick_new(&mut self, pick_at_random: bool) -> Option<DueCard> {
        let len = self.buckets.new_cards().len();
        if len == 0 {
            return None;
        }
        let index = if pick_at_random { self.rng.pick(len) } else { 0 };
        Some(self.due_card(BucketKind::New, index))
    }

    /// Learning cards already due, then reviews, then learning cards that
    /// come due within the collapse window.
    pub fn next_review(&mut self, now: DateTime<Utc>, collapse: Duration) -> Option<DueCard> {
        self.pick_learning_before(now)
            .or_else(|| self.pick_review())
            .or_else(|| self.pick_learning_before(now + collapse))
    }

    /// Next card to present, interleaving new cards in proportion to what is
    /// left of each kind. New cards are never returned once `new_left` is 0.
    pub fn next_card(
        &mut self,
        now: DateTime<Utc>,
        progress: &DailyProgress,
        pick_at_random: bool,
        collapse: Duration,
    ) -> Option<DueCard> {
        if progress.prefers_new() {
            if let Some(card) = self.pick_new(pick_at_random) {
                return Some(card);
            }
        }
        if let Some(card) = self.next_review(now, collapse) {
            return Some(card);
        }
        if progress.new_left > 0 {
            return self.pick_new(pick_at_random);
        }
        None
    }

    fn due_card(&self, bucket: BucketKind, index: usize) -> DueCard {
        DueCard {
            card: self.buckets.get(bucket)[index],
            bucket,
            index,
        }
    }
}
