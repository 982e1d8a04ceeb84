//! Data model shared across the memory core: the addressable [`MemoryItem`],
//! its catalog projection, and the record shapes the journal/video backend
//! persist.
//!
//! This crate has no I/O of its own; it is the common vocabulary that
//! `mem-journal`, `mem-storage`, `mem-video`, `mem-bm25`, `mem-vector`, and
//! `mem-manager` all build on.

mod error;
mod frame;
mod item;
mod journal;
mod payload;
mod summary;

pub use error::ValidationError;
pub use frame::{FrameIndexEntry, FrameType, VideoSegmentManifestEntry};
pub use item::{Facets, Link, MemoryItem, MemoryItemType, Quality, Rel, Scope, Security, Sensitivity};
pub use journal::{genesis_prev_hash, JournalEntry, JournalOp, PREV_HASH_LEN};
pub use payload::{BackendKind, PayloadRef};
pub use summary::MemoryItemSummary;
