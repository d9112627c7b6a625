//! Daily allocation scheduler.
//!
//! Runs one allocation pass per day at a configured local time, plus
//! optional passes at startup and on demand.

pub mod daemon;
pub mod error;
pub mod schedule;

pub use daemon::Scheduler;
pub use error::SchedulerError;
