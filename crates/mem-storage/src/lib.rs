//! The pluggable storage backend contract ([`StorageBackend`]) and the file
//! backend that implements it directly against the filesystem.
//!
//! The video-coded backend lives in `mem-video`; it implements the same
//! trait defined here so the Memory Manager never has to know which one it
//! is talking to.

mod backend;
mod error;
mod file_backend;
mod lock;

pub use backend::{BackendStats, IndexUpdateCallback, StorageBackend};
pub use error::{DecodeStage, StorageError};
pub use file_backend::{rebuild_catalog_from_journal, scope_root, FileBackend};
pub use lock::{acquire as acquire_lock, LockGuard, STALE_AFTER_MS};
pub use mem_journal::VerifyReport;
