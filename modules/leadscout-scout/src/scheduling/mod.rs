pub mod budget;
pub mod selector;

pub use budget::BudgetTracker;
pub use selector::{Eligibility, PostScheduler, ScheduleReason, ScheduleResult, ScheduledPost, SkipCounts};
