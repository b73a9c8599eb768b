//! Durable state for tracked posts, their scrape history and the people who
//! engaged with them.
//!
//! Everything goes through the [`Ledger`] trait. [`PgLedger`] is the real
//! thing; `MemoryLedger` (feature `test-support`) keeps the same contract in
//! a mutex for unit tests.

mod ledger;
mod postgres;

#[cfg(any(test, feature = "test-support"))]
mod memory;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use ledger::{CommitReceipt, CountMismatch, CycleRecord, Ledger, ScrapeCommit, UpsertStats};
pub use postgres::PgLedger;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryLedger;
