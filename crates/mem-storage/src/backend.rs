//! The backend contract the Memory Manager depends on. Both the file
//! backend (this crate) and the video backend (`mem-video`) implement this
//! trait verbatim; the manager never knows which one it is talking to.

use std::collections::BTreeMap;

use mem_model::{MemoryItem, MemoryItemSummary, PayloadRef};
use mem_journal::VerifyReport;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub item_count: u64,
    pub bytes: u64,
}

/// Callback a backend invokes after each successful persistence event, in
/// journal-append order, with the items that were upserted and the ids that
/// were deleted. The Memory Manager applies these to BM25/vector indexes in
/// the order received.
pub type IndexUpdateCallback = Box<dyn Fn(Vec<MemoryItem>, Vec<String>) + Send + Sync>;

/// The only surface the Memory Manager depends on. See `spec.md` §4.4.
pub trait StorageBackend: Send + Sync {
    /// Durably persist one item. Idempotent on identical content hash (a
    /// repeat write with the same content hash is a no-op beyond refreshing
    /// the catalog summary).
    fn write_item(&self, item: &MemoryItem) -> Result<(), StorageError>;

    /// The current version of an item, or `None` if absent.
    fn read_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError>;

    /// Returns `false` if the id was already absent.
    fn delete_item(&self, id: &str) -> Result<bool, StorageError>;

    /// Batch accessor; every requested id is present as a key even when its
    /// value is `None`.
    fn read_items(&self, ids: &[String]) -> Result<BTreeMap<String, Option<MemoryItem>>, StorageError>;

    /// Ids of every item currently visible: includes pending writes, excludes
    /// pending deletes.
    fn list_items(&self) -> Result<Vec<String>, StorageError>;

    /// Catalog projections ordered `(updated_at desc, id desc)`, capped at
    /// `limit` (`spec.md` §4.12 `list`).
    fn list_summaries(&self, limit: Option<usize>) -> Result<Vec<MemoryItemSummary>, StorageError>;

    fn has_content(&self, hashes: &[String]) -> Result<BTreeMap<String, bool>, StorageError>;

    fn get_by_hash(&self, hashes: &[String]) -> Result<BTreeMap<String, PayloadRef>, StorageError>;

    /// Register the callback invoked after each successful persistence
    /// event. Backends only support one subscriber (the owning Memory
    /// Manager); a second call replaces the first.
    fn register_index_update(&self, callback: IndexUpdateCallback);

    fn stats(&self) -> Result<BackendStats, StorageError>;

    /// Reclaim space (orphaned temp files, stale locks, ...); returns bytes
    /// reclaimed.
    fn cleanup(&self) -> Result<u64, StorageError>;

    /// Walk the journal's hash chain and report where (if anywhere) it
    /// breaks. Backends without a journal-backed implementation (none today)
    /// would return `Unsupported`.
    fn verify(&self) -> Result<VerifyReport, StorageError> {
        Err(StorageError::Unsupported("verify".to_string()))
    }

    /// Snapshot the catalog into the journal and truncate entries the
    /// snapshot supersedes. Returns the path of the compacted journal.
    fn compact(&self) -> Result<std::path::PathBuf, StorageError> {
        Err(StorageError::Unsupported("compact".to_string()))
    }

    /// Re-derive the catalog (and, where the backend stores item bytes
    /// outside the journal, any item bytes missing from their primary
    /// location) purely from a full journal replay. Used by the Memory
    /// Manager's `rebuild(scope)` to recover from out-of-band loss of
    /// `items/` files or a deleted `catalog.json` (`spec.md` §8 scenario 4).
    fn rebuild_from_journal(&self) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("rebuild_from_journal".to_string()))
    }
}
