mod card;
mod conf;
mod deck;
mod ids;
mod review;

pub use ids::{CardId, ConfId, DeckId};

pub use card::{AGAIN_STEP, Card, CardError, CardQueue, CardState, HARD_STEP};
pub use conf::{ConfError, MAX_COLLAPSE_SECS, Prefs, StudyConf};
pub use deck::{Deck, DeckError, deck_with_descendants};
pub use review::{ReviewError, ReviewGrade, ReviewLog, ReviewOutcome};
