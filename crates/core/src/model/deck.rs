use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::day::DayBoundary;
use crate::model::ids::{CardId, ConfId, DeckId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeckError {
    #[error("deck name cannot be empty")]
    EmptyName,

    #[error("deck cannot be its own parent")]
    SelfParent,
}

//
// ─── DECK ──────────────────────────────────────────────────────────────────────
//

/// A named collection of cards plus its per-day study counters.
///
/// The counters (`new_today`, `revcards_today`, `revlogs_today`) belong to
/// the logical day stored in `today`. They are never cleared eagerly: readers
/// ignore them once `today` is stale and the review commit path resets them on
/// the first answer of a new day.
#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    id: DeckId,
    name: String,
    parent_id: Option<DeckId>,
    conf_id: ConfId,
    today: Option<DateTime<Utc>>,
    new_today: Vec<CardId>,
    revcards_today: Vec<CardId>,
    revlogs_today: Vec<i64>,
    custom_newcard_limit: Option<u32>,
}

impl Deck {
    /// Creates a new Deck with empty counters.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::EmptyName` if name is empty or whitespace-only, and
    /// `DeckError::SelfParent` if `parent_id` equals `id`.
    pub fn new(
        id: DeckId,
        name: impl Into<String>,
        parent_id: Option<DeckId>,
        conf_id: ConfId,
    ) -> Result<Self, DeckError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DeckError::EmptyName);
        }
        if parent_id == Some(id) {
            return Err(DeckError::SelfParent);
        }

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            parent_id,
            conf_id,
            today: None,
            new_today: Vec::new(),
            revcards_today: Vec::new(),
            revlogs_today: Vec::new(),
            custom_newcard_limit: None,
        })
    }

    /// Rebuilds a deck from storage, counters included.
    ///
    /// # Errors
    ///
    /// Same validation as [`Deck::new`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: DeckId,
        name: String,
        parent_id: Option<DeckId>,
        conf_id: ConfId,
        today: Option<DateTime<Utc>>,
        new_today: Vec<CardId>,
        revcards_today: Vec<CardId>,
        revlogs_today: Vec<i64>,
        custom_newcard_limit: Option<u32>,
    ) -> Result<Self, DeckError> {
        let mut deck = Self::new(id, name, parent_id, conf_id)?;
        deck.today = today;
        deck.new_today = new_today;
        deck.revcards_today = revcards_today;
        deck.revlogs_today = revlogs_today;
        deck.custom_newcard_limit = custom_newcard_limit;
        Ok(deck)
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> DeckId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<DeckId> {
        self.parent_id
    }

    #[must_use]
    pub fn conf_id(&self) -> ConfId {
        self.conf_id
    }

    #[must_use]
    pub fn today(&self) -> Option<DateTime<Utc>> {
        self.today
    }

    #[must_use]
    pub fn new_today(&self) -> &[CardId] {
        &self.new_today
    }

    #[must_use]
    pub fn revcards_today(&self) -> &[CardId] {
        &self.revcards_today
    }

    #[must_use]
    pub fn revlogs_today(&self) -> &[i64] {
        &self.revlogs_today
    }

    /// Today's override of the conf's new-card quota.
    #[must_use]
    pub fn custom_newcard_limit(&self) -> Option<u32> {
        self.custom_newcard_limit
    }

    pub fn set_custom_newcard_limit(&mut self, limit: Option<u32>) {
        self.custom_newcard_limit = limit;
    }

    /// True when the counters belong to the logical day containing `now`.
    ///
    /// A deck that has never been studied has no current counters.
    #[must_use]
    pub fn counters_current(&self, boundary: &DayBoundary, now: DateTime<Utc>) -> bool {
        self.today
            .is_some_and(|today| boundary.is_same_day(Some(today), Some(now)))
    }

    /// Records one answer in today's counters, resetting them first when they
    /// belong to an earlier logical day.
    pub fn record_review(
        &mut self,
        boundary: &DayBoundary,
        reviewed_at: DateTime<Utc>,
        card_id: CardId,
        was_new: bool,
        log_id: i64,
    ) {
        if !self.counters_current(boundary, reviewed_at) {
            self.today = Some(boundary.logical_day(reviewed_at));
            self.new_today.clear();
            self.revcards_today.clear();
            self.revlogs_today.clear();
            self.custom_newcard_limit = None;
        }

        if was_new {
            if !self.new_today.contains(&card_id) {
                self.new_today.push(card_id);
            }
        } else if !self.revcards_today.contains(&card_id) {
            self.revcards_today.push(card_id);
        }
        self.revlogs_today.push(log_id);
    }
}

/// Returns `root` followed by all of its descendants, breadth first.
///
/// Decks absent from `decks` are still returned when they are the root, so a
/// caller can surface the missing row as an error.
#[must_use]
pub fn deck_with_descendants(decks: &[Deck], root: DeckId) -> Vec<DeckId> {
    let mut children: HashMap<DeckId, Vec<DeckId>> = HashMap::new();
    for deck in decks {
        if let Some(parent) = deck.parent_id() {
            children.entry(parent).or_default().push(deck.id());
        }
    }

    let mut out = vec![root];
    let mut seen: HashSet<DeckId> = HashSet::from([root]);
    let mut cursor = 0;
    while cursor < out.len() {
        let current = out[cursor];
        cursor += 1;
        if let Some(kids) = children.get(&current) {
            for kid in kids {
                if seen.insert(*kid) {
                    out.push(*kid);
                }
            }
        }
    }
    out
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
