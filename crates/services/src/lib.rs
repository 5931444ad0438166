#![forbid(unsafe_code)]

pub mod error;
pub mod review_service;
pub mod scheduler;
pub mod study_loop;

pub use study_core::Clock;

pub use error::{ReviewServiceError, SchedulerError, StudyError};
pub use review_service::{GradedCard, ReviewService};
pub use scheduler::StudyScheduler;
pub use study_loop::{StudyAnswer, StudyLoop};
