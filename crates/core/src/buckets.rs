//! Partitioning of a deck set into the three working sets a study session
//! draws from.

use chrono::{DateTime, Utc};

use crate::day::DayBoundary;
use crate::model::{Card, CardId, CardState, DeckId};

/// Which working set a card was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    New = 0,
    Learning = 1,
    Review = 2,
}

/// Lightweight, non-owning handle to a gathered card.
///
/// Full cards stay in the store and are resolved by id when needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardRef {
    pub id: CardId,
    pub deck_id: DeckId,
    pub due: DateTime<Utc>,
}

impl From<&Card> for CardRef {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id(),
            deck_id: card.deck_id(),
            due: card.due(),
        }
    }
}

/// The New, Learning and Review buckets as of one logical day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    new: Vec<CardRef>,
    learning: Vec<CardRef>,
    review: Vec<CardRef>,
}

impl Buckets {
    /// Sorts `cards` into buckets as of `now`.
    ///
    /// New is sorted by `due` (stable); Learning and Review keep encounter order.
    pub fn gather<'a>(
        cards: impl IntoIterator<Item = &'a Card>,
        boundary: &DayBoundary,
        now: DateTime<Utc>,
    ) -> Self {
        let today = boundary.start_of_day(now);
        let mut buckets = Self::default();
        for card in cards {
            if let Some(kind) = classify(card, boundary, today) {
                buckets.bucket_mut(kind).push(CardRef::from(card));
            }
        }
        buckets.new.sort_by_key(|c| c.due);
        buckets
    }

    /// Re-applies the gather rules to one card, replacing any entry it already
    /// has. Returns the bucket it landed in, if any.
    pub fn place(
        &mut self,
        card: &Card,
        boundary: &DayBoundary,
        now: DateTime<Utc>,
    ) -> Option<BucketKind> {
        self.forget(card.id());
        let kind = classify(card, boundary, boundary.start_of_day(now))?;
        let entry = CardRef::from(card);
        match kind {
            BucketKind::New => {
                let at = self.new.partition_point(|c| c.due <= entry.due);
                self.new.insert(at, entry);
            }
            BucketKind::Learning | BucketKind::Review => self.bucket_mut(kind).push(entry),
        }
        Some(kind)
    }

    /// Removes the entry at `index` of `kind`.
    pub fn remove(&mut self, kind: BucketKind, index: usize) -> Option<CardRef> {
        let bucket = self.bucket_mut(kind);
        (index < bucket.len()).then(|| bucket.remove(index))
    }

    /// Removes `id` from whichever bucket holds it.
    pub fn forget(&mut self, id: CardId) -> Option<(BucketKind, CardRef)> {
        let (kind, index) = self.locate(id)?;
        self.remove(kind, index).map(|r| (kind, r))
    }

    /// Bucket and index currently holding `id`.
    #[must_use]
    pub fn locate(&self, id: CardId) -> Option<(BucketKind, usize)> {
        [BucketKind::New, BucketKind::Learning, BucketKind::Review]
            .into_iter()
            .find_map(|kind| {
                self.get(kind)
                    .iter()
                    .position(|c| c.id == id)
                    .map(|i| (kind, i))
            })
    }

    #[must_use]
    pub fn get(&self, kind: BucketKind) -> &[CardRef] {
        match kind {
            BucketKind::New => &self.new,
            BucketKind::Learning => &self.learning,
            BucketKind::Review => &self.review,
        }
    }

    #[must_use]
    pub fn new_cards(&self) -> &[CardRef] {
        &self.new
    }

    #[must_use]
    pub fn learning(&self) -> &[CardRef] {
        &self.learning
    }

    #[must_use]
    pub fn review(&self) -> &[CardRef] {
        &self.review
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.new.len() + self.learning.len() + self.review.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_mut(&mut self, kind: BucketKind) -> &mut Vec<CardRef> {
        match kind {
            BucketKind::New => &mut self.new,
            BucketKind::Learning => &mut self.learning,
            BucketKind::Review => &mut self.review,
        }
    }
}

/// Gather rules, first match wins.
fn classify(card: &Card, boundary: &DayBoundary, today: DateTime<Utc>) -> Option<BucketKind> {
    if card.queue().is_hidden() {
        return None;
    }
    if card.state() == CardState::New {
        return Some(BucketKind::New);
    }
    if card.in_short_term_learning() {
        return Some(BucketKind::Learning);
    }
    if boundary.start_of_day(card.due()) <= today {
        return Some(BucketKind::Review);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardQueue, ReviewGrade, ReviewOutcome};
    use crate::spacing::MemoryState;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn new_card(id: u64, due_offset_mins: i64) -> Card {
        Card::new(
            CardId::new(id),
            DeckId::new(1),
            fixed_now() + Duration::minutes(due_offset_mins),
        )
    }

    fn reviewed(id: u64, grade: ReviewGrade, days: u32, reviewed_at: DateTime<Utc>) -> Card {
        let mut card = Card::new(CardId::new(id), DeckId::new(1), reviewed_at);
        let outcome = ReviewOutcome::new(
            reviewed_at + Duration::days(i64::from(days)),
            2.0,
            5.0,
            0.0,
            days,
        );
        card.apply_review(grade, &outcome, reviewed_at);
        card
    }

    /// A learning-phase card loaded with a day interval.
    fn stepped(id: u64, state: CardState, due: DateTime<Utc>, scheduled_days: u32) -> Card {
        Card::from_persisted(
            CardId::new(id),
            DeckId::new(1),
            CardQueue::Active,
            state,
            due,
            scheduled_days,
            3,
            u32::from(state == CardState::Relearning),
            Some(due - Duration::days(i64::from(scheduled_days))),
            Some(MemoryState::new(4.0, 5.5)),
        )
        .unwrap()
    }

    fn ids(refs: &[CardRef]) -> Vec<u64> {
        refs.iter().map(|c| c.id.value()).collect()
    }

    #[test]
    fn gather_partitions_by_state_and_due() {
        let boundary = DayBoundary::default();
        let now = fixed_now();
        let cards = vec![
            new_card(1, 0),
            reviewed(2, ReviewGrade::Again, 1, now - Duration::minutes(5)),
            reviewed(3, ReviewGrade::Good, 1, now - Duration::days(1)),
            reviewed(4, ReviewGrade::Good, 5, now),
        ];

        let b = Buckets::gather(&cards, &boundary, now);
        assert_eq!(ids(b.new_cards()), vec![1]);
        assert_eq!(ids(b.learning()), vec![2]);
        assert_eq!(ids(b.review()), vec![3]);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn gather_skips_suspended_and_buried() {
        let boundary = DayBoundary::default();
        let mut suspended = new_card(1, 0);
        suspended.suspend();
        let mut buried = reviewed(2, ReviewGrade::Again, 1, fixed_now());
        buried.bury();
        assert_eq!(buried.queue(), CardQueue::Buried);

        let b = Buckets::gather(&[suspended, buried], &boundary, fixed_now());
        assert!(b.is_empty());
    }

    #[test]
    fn review_due_later_today_counts_as_due() {
        // Due at 23:00 on the same logical day as a 22:13 "now".
        let boundary = DayBoundary::default();
        let now = fixed_now();
        let card = reviewed(1, ReviewGrade::Good, 1, now - Duration::days(1) + Duration::minutes(50));
        assert!(card.due() > now);

        let b = Buckets::gather([&card], &boundary, now);
        assert_eq!(ids(b.review()), vec![1]);
    }

    #[test]
    fn learning_with_interval_is_gathered_as_review_once_due() {
        let boundary = DayBoundary::default();
        let now = fixed_now();
        let cards = vec![
            stepped(1, CardState::Learning, now - Duration::hours(2), 1),
            stepped(2, CardState::Relearning, now - Duration::days(3), 2),
            stepped(3, CardState::Relearning, now + Duration::hours(1), 1),
        ];
        assert!(cards.iter().all(|c| !c.in_short_term_learning()));

        let b = Buckets::gather(&cards, &boundary, now);
        assert!(b.learning().is_empty());
        assert!(b.new_cards().is_empty());
        assert_eq!(ids(b.review()), vec![1, 2, 3]);
    }

    #[test]
    fn learning_with_interval_due_on_a_later_day_is_left_out() {
        let boundary = DayBoundary::default();
        let now = fixed_now();
        let cards = vec![
            stepped(1, CardState::Learning, now + Duration::days(2), 2),
            stepped(2, CardState::Relearning, now + Duration::hours(3), 1),
        ];

        let b = Buckets::gather(&cards, &boundary, now);
        assert!(b.is_empty());
    }

    #[test]
    fn new_bucket_is_sorted_by_due_and_stable() {
        let boundary = DayBoundary::default();
        let cards = vec![new_card(1, 30), new_card(2, 10), new_card(3, 30), new_card(4, 0)];
        let b = Buckets::gather(&cards, &boundary, fixed_now());
        assert_eq!(ids(b.new_cards()), vec![4, 2, 1, 3]);
    }

    #[test]
    fn each_card_lands_in_at_most_one_bucket() {
        let boundary = DayBoundary::default();
        let now = fixed_now();
        let cards: Vec<Card> = (0..12)
            .map(|i| match i % 3 {
                0 => new_card(i, i as i64),
                1 => reviewed(i, ReviewGrade::Again, 1, now),
                _ => reviewed(i, ReviewGrade::Good, 1, now - Duration::days(2)),
            })
            .collect();

        let b = Buckets::gather(&cards, &boundary, now);
        for card in &cards {
            let hits = [BucketKind::New, BucketKind::Learning, BucketKind::Review]
                .into_iter()
                .filter(|k| b.get(*k).iter().any(|c| c.id == card.id()))
                .count();
            assert_eq!(hits, 1, "card {}", card.id());
        }
    }

    #[test]
    fn place_moves_card_between_buckets() {
        let boundary = DayBoundary::default();
        let now = fixed_now();
        let mut card = new_card(1, 0);
        let mut b = Buckets::gather([&card], &boundary, now);

        let outcome = ReviewOutcome::new(now + Duration::days(1), 2.0, 5.0, 0.0, 1);
        card.apply_review(ReviewGrade::Again, &outcome, now);
        assert_eq!(b.place(&card, &boundary, now), Some(BucketKind::Learning));
        assert!(b.new_cards().is_empty());
        assert_eq!(ids(b.learning()), vec![1]);

        card.apply_review(ReviewGrade::Good, &outcome, now);
        assert_eq!(b.place(&card, &boundary, now), None);
        assert!(b.is_empty());
    }

    #[test]
    fn place_keeps_new_bucket_sorted() {
        let boundary = DayBoundary::default();
        let cards = vec![new_card(1, 0), new_card(2, 20)];
        let mut b = Buckets::gather(&cards, &boundary, fixed_now());
        b.place(&new_card(3, 10), &boundary, fixed_now());
        assert_eq!(ids(b.new_cards()), vec![1, 3, 2]);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut b = Buckets::default();
        assert!(b.remove(BucketKind::Review, 0).is_none());
        assert!(b.forget(CardId::new(9)).is_none());
    }
}
