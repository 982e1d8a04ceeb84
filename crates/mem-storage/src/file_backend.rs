//! The journal-indexed file store: one JSON file per item under `items/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use mem_journal::{Catalog, Journal};
use mem_model::{BackendKind, JournalOp, MemoryItem, MemoryItemSummary, PayloadRef};

use crate::backend::{BackendStats, IndexUpdateCallback, StorageBackend};
use crate::error::StorageError;
use crate::lock;

/// On-disk layout rooted at `<scope-root>/`, see `spec.md` §6.
pub struct FileBackend {
    root: PathBuf,
    journal: Journal,
    catalog: Catalog,
    callback: RwLock<Option<IndexUpdateCallback>>,
    actor: String,
}

impl FileBackend {
    pub fn open(root: impl Into<PathBuf>, actor: impl Into<String>, fsync_batch: usize) -> Result<Self, StorageError> {
        let root = root.into();
        for dir in ["items", "tmp", "locks"] {
            std::fs::create_dir_all(root.join(dir)).map_err(|e| StorageError::io("open.mkdir", e))?;
        }
        let journal = Journal::open(root.join("journal.ndjson"), fsync_batch)?;
        let catalog = Catalog::open(root.join("catalog.json"))?;
        Ok(Self {
            root,
            journal,
            catalog,
            callback: RwLock::new(None),
            actor: actor.into(),
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn item_path(&self, id: &str) -> PathBuf {
        self.root.join("items").join(format!("{id}.json"))
    }

    fn tmp_path(&self, id: &str) -> PathBuf {
        self.root.join("tmp").join(format!("{id}.tmp"))
    }

    fn lock_path(&self, op: &str) -> PathBuf {
        self.root.join("locks").join(format!("{op}.lock"))
    }

    fn notify(&self, upserted: Vec<MemoryItem>, deleted: Vec<String>) {
        if let Some(cb) = self.callback.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            cb(upserted, deleted);
        }
    }

    fn read_item_file(&self, id: &str) -> Result<Option<MemoryItem>, StorageError> {
        let path = self.item_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|e| StorageError::io("read_item", e))?;
        let item: MemoryItem = serde_json::from_slice(&bytes)?;
        Ok(Some(item))
    }
}

impl StorageBackend for FileBackend {
    fn write_item(&self, item: &MemoryItem) -> Result<(), StorageError> {
        item.validate().map_err(|e| StorageError::Config(e.to_string()))?;
        let content_hash = item.content_hash();

        if let Some(mut existing) = self.catalog.get(&item.id) {
            if existing.content_hash == content_hash {
                // Idempotent: no new journal record or item-file rewrite,
                // but the summary's updated_at still reflects this write
                // attempt (spec.md §8 "Idempotence").
                tracing::debug!(id = %item.id, "write_item no-op: content hash unchanged");
                existing.updated_at = item.updated_at;
                self.catalog.upsert(existing);
                self.catalog.persist()?;
                return Ok(());
            }
        }

        let _guard = lock::acquire(&self.lock_path("write"))?;

        self.journal.append(
            JournalOp::Upsert,
            item.id.clone(),
            Some(content_hash.clone()),
            self.actor.clone(),
            Some(serde_json::json!({ "item": item })),
        )?;

        let bytes = serde_json::to_vec(item)?;
        let tmp_path = self.tmp_path(&item.id);
        std::fs::write(&tmp_path, &bytes).map_err(|e| StorageError::io("write_item.tmp", e))?;
        std::fs::rename(&tmp_path, self.item_path(&item.id))
            .map_err(|e| StorageError::io("write_item.rename", e))?;

        let summary = MemoryItemSummary::from_item(item, content_hash, bytes.len() as u64);
        self.catalog.upsert(summary);
        self.catalog.persist()?;

        tracing::info!(id = %item.id, version = item.version, "item written");
        self.notify(vec![item.clone()], vec![]);
        Ok(())
    }

    fn read_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError> {
        if !self.catalog.contains(id) {
            return Ok(None);
        }
        match self.read_item_file(id)? {
            Some(item) => Ok(Some(item)),
            None => {
                tracing::warn!(id, "catalog entry present but items/ file missing; needs rebuild");
                Err(StorageError::Integrity {
                    broken_at: 0,
                    detail: format!("catalog has id={id} but its item file is missing"),
                })
            }
        }
    }

    fn delete_item(&self, id: &str) -> Result<bool, StorageError> {
        if !self.catalog.contains(id) {
            return Ok(false);
        }
        let _guard = lock::acquire(&self.lock_path("delete"))?;

        self.journal
            .append(JournalOp::Delete, id.to_string(), None, self.actor.clone(), None)?;

        let path = self.item_path(id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| StorageError::io("delete_item", e))?;
        }
        self.catalog.remove(id);
        self.catalog.persist()?;

        tracing::info!(id, "item deleted");
        self.notify(vec![], vec![id.to_string()]);
        Ok(true)
    }

    fn read_items(&self, ids: &[String]) -> Result<BTreeMap<String, Option<MemoryItem>>, StorageError> {
        let mut out = BTreeMap::new();
        for id in ids {
            out.insert(id.clone(), self.read_item(id)?);
        }
        Ok(out)
    }

    fn list_items(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.catalog.ids())
    }

    fn list_summaries(&self, limit: Option<usize>) -> Result<Vec<MemoryItemSummary>, StorageError> {
        Ok(self.catalog.list(limit))
    }

    fn has_content(&self, hashes: &[String]) -> Result<BTreeMap<String, bool>, StorageError> {
        let wanted: std::collections::BTreeSet<&String> = hashes.iter().collect();
        let mut found: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for id in self.catalog.ids() {
            if let Some(summary) = self.catalog.get(&id) {
                if wanted.contains(&summary.content_hash) {
                    found.insert(summary.content_hash);
                }
            }
        }
        Ok(hashes.iter().map(|h| (h.clone(), found.contains(h))).collect())
    }

    fn get_by_hash(&self, hashes: &[String]) -> Result<BTreeMap<String, PayloadRef>, StorageError> {
        let wanted: std::collections::BTreeSet<&String> = hashes.iter().collect();
        let mut out = BTreeMap::new();
        for id in self.catalog.ids() {
            if let Some(summary) = self.catalog.get(&id) {
                if wanted.contains(&summary.content_hash) && !out.contains_key(&summary.content_hash) {
                    out.insert(
                        summary.content_hash.clone(),
                        PayloadRef {
                            content_hash: summary.content_hash,
                            backend: BackendKind::File,
                            segment_id: None,
                            frame_start: None,
                            frame_end: None,
                        },
                    );
                }
            }
        }
        Ok(out)
    }

    fn register_index_update(&self, callback: IndexUpdateCallback) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    fn stats(&self) -> Result<BackendStats, StorageError> {
        let mut bytes = 0u64;
        for id in self.catalog.ids() {
            if let Some(summary) = self.catalog.get(&id) {
                bytes += summary.size_bytes;
            }
        }
        Ok(BackendStats {
            item_count: self.catalog.len() as u64,
            bytes,
        })
    }

    fn cleanup(&self) -> Result<u64, StorageError> {
        let mut reclaimed = 0u64;
        let tmp_dir = self.root.join("tmp");
        if let Ok(entries) = std::fs::read_dir(&tmp_dir) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    reclaimed += meta.len();
                }
                let _ = std::fs::remove_file(entry.path());
            }
        }

        let items_dir = self.root.join("items");
        if let Ok(entries) = std::fs::read_dir(&items_dir) {
            for entry in entries.flatten() {
                let Some(stem) = entry.path().file_stem().map(|s| s.to_string_lossy().to_string()) else {
                    continue;
                };
                if !self.catalog.contains(&stem) {
                    if let Ok(meta) = entry.metadata() {
                        reclaimed += meta.len();
                    }
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        Ok(reclaimed)
    }

    fn verify(&self) -> Result<mem_journal::VerifyReport, StorageError> {
        Ok(self.journal.verify()?)
    }

    fn compact(&self) -> Result<std::path::PathBuf, StorageError> {
        let path = self.journal.compact(&self.catalog.digest(), &self.actor)?;
        Ok(path)
    }

    fn rebuild_from_journal(&self) -> Result<(), StorageError> {
        rebuild_catalog_from_journal(self)
    }
}

/// Rebuild a backend's catalog entirely from journal replay, e.g. after
/// `items/*.json` or `catalog.json` were deleted out-of-band. Any item file
/// missing from `items/` whose full body is still recoverable from the
/// journal's `meta.item` field is rewritten in place before its summary is
/// added back to the catalog, so a subsequent `read_item` succeeds.
pub fn rebuild_catalog_from_journal(backend: &FileBackend) -> Result<(), StorageError> {
    let outcome = backend.journal.replay(None)?;
    let mut rebuilt = BTreeMap::new();
    for entry in outcome.entries {
        match entry.op {
            JournalOp::Upsert => {
                let item = match backend.read_item_file(&entry.id)? {
                    Some(item) => Some(item),
                    None => entry
                        .meta
                        .as_ref()
                        .and_then(|m| m.get("item").cloned())
                        .and_then(|v| serde_json::from_value::<mem_model::MemoryItem>(v).ok()),
                };
                let Some(item) = item else {
                    tracing::warn!(id = %entry.id, "rebuild: item body unrecoverable from items/ or journal meta");
                    continue;
                };
                let path = backend.item_path(&entry.id);
                if !path.exists() {
                    let bytes = serde_json::to_vec(&item)?;
                    let tmp_path = backend.tmp_path(&entry.id);
                    std::fs::write(&tmp_path, &bytes).map_err(|e| StorageError::io("rebuild.write_item", e))?;
                    std::fs::rename(&tmp_path, &path).map_err(|e| StorageError::io("rebuild.rename_item", e))?;
                    tracing::info!(id = %entry.id, "rebuild: restored missing item file from journal");
                }
                let hash = entry.content_hash.unwrap_or_else(|| item.content_hash());
                let size = serde_json::to_vec(&item).map(|b| b.len() as u64).unwrap_or(0);
                rebuilt.insert(entry.id.clone(), MemoryItemSummary::from_item(&item, hash, size));
            }
            JournalOp::Delete => {
                rebuilt.remove(&entry.id);
            }
            JournalOp::Link | JournalOp::Snapshot => {}
        }
    }
    backend.catalog.replace_all(rebuilt);
    backend.catalog.persist()?;
    Ok(())
}

pub fn scope_root(backend: &FileBackend) -> &Path {
    &backend.root
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mem_model::{Facets, MemoryItemType, Quality, Scope, Security};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn sample_item(id: &str) -> MemoryItem {
        MemoryItem {
            id: id.to_string(),
            item_type: MemoryItemType::Snippet,
            scope: Scope::Local,
            title: "api call".to_string(),
            text: Some("useApi hook".to_string()),
            code: Some("fn x(){}".to_string()),
            language: None,
            facets: Facets::default(),
            context: Default::default(),
            quality: Quality::default(),
            security: Security::default(),
            links: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        let item = sample_item("01HQZ2YX9K7M8N5P6Q3R4S");
        backend.write_item(&item).unwrap();

        let read_back = backend.read_item(&item.id).unwrap().unwrap();
        assert_eq!(read_back, item);
        assert_eq!(backend.stats().unwrap().item_count, 1);
        assert!(dir.path().join("items").join(format!("{}.json", item.id)).exists());
    }

    #[test]
    fn delete_then_read_returns_absent() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        let item = sample_item("id-1");
        backend.write_item(&item).unwrap();
        assert!(backend.delete_item(&item.id).unwrap());
        assert!(backend.read_item(&item.id).unwrap().is_none());
        assert!(!backend.delete_item(&item.id).unwrap());
    }

    #[test]
    fn callback_fires_on_write_and_delete() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        backend.register_index_update(Box::new(move |up, del| {
            seen2.lock().unwrap().push((up.len(), del.len()));
        }));
        let item = sample_item("id-1");
        backend.write_item(&item).unwrap();
        backend.delete_item(&item.id).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 0), (0, 1)]);
    }

    #[test]
    fn rebuild_recovers_catalog_from_journal_and_item_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        let ids: Vec<String> = (0..3).map(|i| format!("id-{i}")).collect();
        for id in &ids {
            backend.write_item(&sample_item(id)).unwrap();
        }

        // Corrupt only the catalog projection; item bodies and the journal
        // (the real source of truth) are untouched.
        std::fs::remove_file(dir.path().join("catalog.json")).unwrap();

        let backend2 = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        assert!(backend2.catalog().is_empty());
        rebuild_catalog_from_journal(&backend2).unwrap();

        let mut rebuilt_ids = backend2.list_items().unwrap();
        rebuilt_ids.sort();
        let mut expected_ids = ids.clone();
        expected_ids.sort();
        assert_eq!(rebuilt_ids, expected_ids);
        for id in &ids {
            assert!(backend2.read_item(id).unwrap().is_some());
        }
    }

    #[test]
    fn repeat_write_with_unchanged_content_hash_is_a_single_journal_upsert() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        let item = sample_item("id-1");
        backend.write_item(&item).unwrap();

        let mut revised_timestamp_only = item.clone();
        revised_timestamp_only.updated_at = item.updated_at + chrono::Duration::seconds(1);
        backend.write_item(&revised_timestamp_only).unwrap();

        let outcome = backend.journal.replay(None).unwrap();
        let upserts = outcome.entries.iter().filter(|e| e.op == JournalOp::Upsert).count();
        assert_eq!(upserts, 1, "unchanged content hash must not append a second journal upsert");

        let summary = backend.catalog().get(&item.id).unwrap();
        assert_eq!(summary.updated_at, revised_timestamp_only.updated_at);
    }

    #[test]
    fn rebuild_restores_item_files_deleted_out_of_band() {
        // spec.md §8 scenario 4: delete items/*.json while leaving the
        // journal intact, then rebuild; list and read_item must both
        // recover exactly as if nothing had been deleted.
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), "tester@1", 1).unwrap();
        let ids: Vec<String> = (0..3).map(|i| format!("id-{i}")).collect();
        for id in &ids {
            backend.write_item(&sample_item(id)).unwrap();
        }

        for entry in std::fs::read_dir(dir.path().join("items")).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }

        rebuild_catalog_from_journal(&backend).unwrap();

        let mut listed = backend.list_items().unwrap();
        listed.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(listed, expected);
        for id in &ids {
            let item = backend.read_item(id).unwrap();
            assert_eq!(item.unwrap().id, *id);
            assert!(dir.path().join("items").join(format!("{id}.json")).exists());
        }
    }
}
