//! The hash-chained journal and the in-memory catalog it rebuilds.
//!
//! [`Journal`] is the source of truth for recovery: every mutation is
//! appended before it is applied anywhere else, and [`Journal::replay`] can
//! reconstruct [`Catalog`] contents from nothing but the log. [`Catalog`] is
//! the fast path readers actually use day to day.

mod catalog;
mod error;
mod journal;

pub use catalog::Catalog;
pub use error::JournalError;
pub use journal::{Journal, ReplayOutcome, VerifyReport};
