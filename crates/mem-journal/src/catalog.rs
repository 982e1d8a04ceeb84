//! The in-memory `id -> summary` catalog, persisted atomically as a single
//! JSON file and rebuildable from a journal replay.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use mem_model::MemoryItemSummary;

use crate::error::JournalError;

/// Authoritative listing surface: readers never scan the `items/` directory,
/// they consult this map.
pub struct Catalog {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, MemoryItemSummary>>,
}

impl Catalog {
    /// Load `path` if it exists, otherwise start empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path)?;
            if bytes.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn upsert(&self, summary: MemoryItemSummary) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(summary.id.clone(), summary);
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<MemoryItemSummary> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// All ids currently in the catalog, in storage (BTreeMap) order. Used
    /// by `list_items()` on storage backends.
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Listing ordered by `(updated_at desc, id desc)`, capped at `limit`.
    pub fn list(&self, limit: Option<usize>) -> Vec<MemoryItemSummary> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut items: Vec<MemoryItemSummary> = guard.values().cloned().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        items
    }

    /// Replace the whole catalog (used by `rebuild`).
    pub fn replace_all(&self, new_entries: BTreeMap<String, MemoryItemSummary>) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *guard = new_entries;
    }

    /// A deterministic digest of the catalog's contents, used as the payload
    /// of a journal snapshot record during `compact()`.
    pub fn digest(&self) -> String {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        mem_hash::content_hash(&*guard)
    }

    /// Atomically persist the catalog via temp file + rename.
    pub fn persist(&self) -> Result<(), JournalError> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let bytes = serde_json::to_vec(&*guard)?;
        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mem_model::{MemoryItemType, Scope, Sensitivity};
    use tempfile::tempdir;

    fn summary(id: &str) -> MemoryItemSummary {
        MemoryItemSummary {
            id: id.to_string(),
            item_type: MemoryItemType::Note,
            scope: Scope::Local,
            title: "t".to_string(),
            updated_at: Utc::now(),
            pinned: false,
            sensitivity: Sensitivity::Team,
            content_hash: "h".to_string(),
            size_bytes: 10,
        }
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let cat = Catalog::open(&path).unwrap();
        cat.upsert(summary("a"));
        cat.upsert(summary("b"));
        cat.persist().unwrap();

        let reloaded = Catalog::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("a"));
    }

    #[test]
    fn remove_returns_false_when_absent() {
        let dir = tempdir().unwrap();
        let cat = Catalog::open(dir.path().join("catalog.json")).unwrap();
        assert!(!cat.remove("missing"));
    }
}
