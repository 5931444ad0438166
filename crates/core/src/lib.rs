#![forbid(unsafe_code)]

pub mod buckets;
pub mod day;
pub mod model;
pub mod quota;
pub mod selector;
pub mod spacing;
pub mod time;

pub use day::DayBoundary;
pub use time::Clock;
