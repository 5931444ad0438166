//! Shared error types for the services crate.

use thiserror::Error;

use study_core::model::{ConfId, DeckId};
use study_core::spacing::SpacingError;
use study_storage::repository::StorageError;

/// Errors emitted by `StudyScheduler`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error("a study session needs at least one deck")]
    NoDecks,
    #[error("deck {0} not found")]
    DeckNotFound(DeckId),
    #[error("study conf {0} not found")]
    ConfNotFound(ConfId),
    #[error("preferences have not been saved")]
    PrefsNotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewServiceError {
    #[error(transparent)]
    Spacing(#[from] SpacingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `StudyLoop`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyError {
    #[error("card {0} is no longer in the store")]
    CardMissing(study_core::model::CardId),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Review(#[from] ReviewServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
