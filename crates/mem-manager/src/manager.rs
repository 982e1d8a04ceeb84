//! The Memory Manager (`spec.md` §4.12): owns one [`mem_storage::StorageBackend`],
//! one BM25 index, and one vector index per open scope, serializes writes per
//! scope on a single lane, and fuses hybrid query results. Grounded on
//! `matcher::Matcher` (owns the shared index handle, composes stages behind
//! one public surface) and `index::InMemoryBackend` (`RwLock`-guarded maps).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use parking_lot::Mutex;

use mem_bm25::InvertedIndex;
use mem_hash::IdGenerator;
use mem_model::{MemoryItem, MemoryItemSummary, Rel, Scope};
use mem_rank::{compute_alpha, fuse_candidates, ScoredCandidate};
use mem_storage::{FileBackend, StorageBackend, StorageError, VerifyReport};
use mem_vector::VectorIndex;
use mem_video::{OnCodecMissing, VideoBackend};

use crate::config::{ScopeConfig, StorageBackendKind};
use crate::error::{MemoryError, OperationError};
use crate::query::{build_context_pack, Query, QueryFacets, QueryResult, ReturnMode};
use crate::redact::redact_secrets;
use crate::state::ScopeState;

/// Order `get`/`delete` search open scopes in when no scope is given.
const SCOPE_PRIORITY: [Scope; 3] = [Scope::Local, Scope::Committed, Scope::Global];

fn scope_dir_name(scope: Scope) -> &'static str {
    match scope {
        Scope::Global => "global",
        Scope::Local => "local",
        Scope::Committed => "committed",
    }
}

struct ScopeHandle {
    backend: Box<dyn StorageBackend>,
    bm25: RwLock<InvertedIndex>,
    vector: RwLock<Option<VectorIndex>>,
    state: RwLock<ScopeState>,
    write_lane: Mutex<()>,
    in_flight: AtomicUsize,
    config: ScopeConfig,
}

impl ScopeHandle {
    fn set_state(&self, to: ScopeState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !guard.can_transition_to(to) {
            tracing::warn!(from = ?*guard, to = ?to, "non-standard scope state transition forced");
        }
        *guard = to;
    }

    fn current_state(&self) -> ScopeState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire a bounded write slot for the duration of the closure, failing
    /// `Busy` if the configured queue capacity is already spoken for
    /// (`spec.md` §5 "Back-pressure").
    fn with_write_permit<T>(&self, f: impl FnOnce() -> Result<T, MemoryError>) -> Result<T, MemoryError> {
        if !self.current_state().accepts_writes() {
            return Err(MemoryError::Conflict(self.current_state()));
        }
        let capacity = self.config.storage.write_queue_capacity;
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous >= capacity {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(MemoryError::Storage(StorageError::Busy));
        }
        let _lane = self.write_lane.lock();
        let result = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Orchestrates storage + index lifecycle for however many scopes a caller
/// opens. One instance is cheap to hold for a process's whole lifetime.
pub struct MemoryManager {
    base_root: PathBuf,
    actor: String,
    id_gen: IdGenerator,
    scopes: RwLock<HashMap<Scope, ScopeHandle>>,
}

impl MemoryManager {
    pub fn new(base_root: impl Into<PathBuf>, actor: impl Into<String>) -> Self {
        Self {
            base_root: base_root.into(),
            actor: actor.into(),
            id_gen: IdGenerator::new(),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    fn scope_root(&self, scope: Scope) -> PathBuf {
        self.base_root.join(scope_dir_name(scope))
    }

    fn open_backend(&self, scope: Scope, config: &ScopeConfig) -> Result<Box<dyn StorageBackend>, MemoryError> {
        let root = self.scope_root(scope);
        match config.storage.backend {
            StorageBackendKind::File => {
                let backend = FileBackend::open(root, self.actor.clone(), config.storage.journal_fsync_batch)?;
                Ok(Box::new(backend))
            }
            StorageBackendKind::Video => {
                let probe = mem_video::select_codec().map_err(|e| MemoryError::Storage(e.into()))?;
                if probe.is_none() && config.video.on_codec_missing == OnCodecMissing::Fallback {
                    tracing::warn!(scope = scope_dir_name(scope), "no video codec available, falling back to file backend");
                    let backend = FileBackend::open(root, self.actor.clone(), config.storage.journal_fsync_batch)?;
                    return Ok(Box::new(backend));
                }
                let backend = VideoBackend::open(
                    root,
                    self.actor.clone(),
                    config.storage.journal_fsync_batch,
                    config.video.to_encode_options(),
                    config.qr,
                )
                .map_err(|e| MemoryError::Storage(e.into()))?;
                Ok(Box::new(backend))
            }
        }
    }

    /// Open one scope's state machine through `UNINITIALIZED → OPENING →
    /// REPLAYING → READY`, building the BM25 index from the catalog's full
    /// items along the way. The vector index starts empty: embeddings are
    /// supplied per-`upsert` and are not durably persisted by this core.
    pub fn open_scope(&self, scope: Scope, config: ScopeConfig) -> Result<(), OperationError> {
        let op = "open_scope";
        {
            let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
            if scopes.contains_key(&scope) {
                return Err(OperationError::new(op, scope_dir_name(scope), MemoryError::AlreadyOpen));
            }
        }

        config
            .validate()
            .map_err(|e| OperationError::new(op, scope_dir_name(scope), MemoryError::ConfigError(e)))?;

        let backend = self.open_backend(scope, &config).map_err(|e| OperationError::new(op, scope_dir_name(scope), e))?;

        let ids = backend.list_items().map_err(|e| OperationError::new(op, scope_dir_name(scope), e.into()))?;
        let items_map = backend
            .read_items(&ids)
            .map_err(|e| OperationError::new(op, scope_dir_name(scope), e.into()))?;
        let items: Vec<MemoryItem> = items_map.into_values().flatten().collect();

        let mut bm25 = InvertedIndex::new(config.bm25);
        bm25.rebuild(&items);

        let handle = ScopeHandle {
            backend,
            bm25: RwLock::new(bm25),
            vector: RwLock::new(None),
            state: RwLock::new(ScopeState::Ready),
            write_lane: Mutex::new(()),
            in_flight: AtomicUsize::new(0),
            config,
        };

        tracing::info!(scope = scope_dir_name(scope), items = items.len(), "scope opened");
        self.scopes.write().unwrap_or_else(|e| e.into_inner()).insert(scope, handle);
        Ok(())
    }

    pub fn close_scope(&self, scope: Scope) -> Result<(), OperationError> {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        match scopes.get(&scope) {
            Some(handle) => {
                handle.set_state(ScopeState::Closed);
                scopes.remove(&scope);
                Ok(())
            }
            None => Err(OperationError::new("close_scope", scope_dir_name(scope), MemoryError::UnknownScope(scope_dir_name(scope).to_string()))),
        }
    }

    fn with_scope<T>(&self, op: &'static str, scope: Scope, f: impl FnOnce(&ScopeHandle) -> Result<T, MemoryError>) -> Result<T, OperationError> {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        let handle = scopes
            .get(&scope)
            .ok_or_else(|| OperationError::new(op, scope_dir_name(scope), MemoryError::UnknownScope(scope_dir_name(scope).to_string())))?;
        f(handle).map_err(|e| OperationError::new(op, scope_dir_name(scope), e))
    }

    fn update_bm25_for_write(handle: &ScopeHandle, item: &MemoryItem) {
        handle.bm25.write().unwrap_or_else(|e| e.into_inner()).index_item(item);
    }

    /// Allocate an id if missing, bump `version`/`updated_at` against the
    /// item's previous revision (if any), validate, persist, and update the
    /// BM25 index; if `embedding` is supplied, also (re)index it in the
    /// vector index (`spec.md` §4.12 `upsert`).
    pub fn upsert(&self, mut item: MemoryItem, embedding: Option<Vec<f32>>) -> Result<String, OperationError> {
        let scope = item.scope;
        self.with_scope("upsert", scope, move |handle| {
            handle.with_write_permit(|| {
                let now = Utc::now();
                if item.id.is_empty() {
                    item.id = mem_hash::generate_id();
                    item.created_at = now;
                    item.version = 1;
                    if item.security.sensitivity == mem_model::Sensitivity::default() {
                        item.security.sensitivity = handle.config.security.sensitivity_default;
                    }
                } else if let Some(prev) = handle.backend.read_item(&item.id)? {
                    item.created_at = prev.created_at;
                    item.version = prev.version + 1;
                } else {
                    item.version = 1;
                }
                item.updated_at = now;

                if handle.config.security.secret_redaction {
                    item.text = item.text.map(|t| redact_secrets(&t));
                    item.code = item.code.map(|c| redact_secrets(&c));
                }

                item.validate().map_err(|e| MemoryError::ConfigError(e.to_string()))?;

                handle.backend.write_item(&item)?;
                Self::update_bm25_for_write(handle, &item);

                if let Some(embedding) = embedding {
                    let mut vector_guard = handle.vector.write().unwrap_or_else(|e| e.into_inner());
                    let index = vector_guard.get_or_insert_with(|| VectorIndex::new(embedding.len(), handle.config.vector));
                    index.add(item.id.clone(), embedding)?;
                }

                Ok(item.id.clone())
            })
        })
    }

    fn scope_search_order(scope: Option<Scope>) -> Vec<Scope> {
        match scope {
            Some(s) => vec![s],
            None => SCOPE_PRIORITY.to_vec(),
        }
    }

    pub fn get(&self, id: &str, scope: Option<Scope>) -> Result<Option<MemoryItem>, OperationError> {
        for candidate in Self::scope_search_order(scope) {
            let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
            let Some(handle) = scopes.get(&candidate) else { continue };
            let found = handle.backend.read_item(id).map_err(|e| OperationError::new("get", scope_dir_name(candidate), e.into()))?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    pub fn delete(&self, id: &str, scope: Option<Scope>) -> Result<bool, OperationError> {
        for candidate in Self::scope_search_order(scope) {
            let deleted = {
                let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
                let Some(handle) = scopes.get(&candidate) else { continue };
                handle
                    .with_write_permit(|| {
                        let removed = handle.backend.delete_item(id)?;
                        if removed {
                            handle.bm25.write().unwrap_or_else(|e| e.into_inner()).remove_item(id);
                            if let Some(index) = handle.vector.write().unwrap_or_else(|e| e.into_inner()).as_mut() {
                                index.remove(id);
                            }
                        }
                        Ok(removed)
                    })
                    .map_err(|e| OperationError::new("delete", scope_dir_name(candidate), e))?
            };
            if deleted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn list(&self, scope: Scope, limit: Option<usize>) -> Result<Vec<MemoryItemSummary>, OperationError> {
        self.with_scope("list", scope, |handle| Ok(handle.backend.list_summaries(limit)?))
    }

    fn mutate_item(&self, op: &'static str, scope: Scope, id: &str, f: impl FnOnce(&mut MemoryItem)) -> Result<String, OperationError> {
        let current = self
            .with_scope(op, scope, |handle| Ok(handle.backend.read_item(id)?))?
            .ok_or_else(|| OperationError::new(op, scope_dir_name(scope), MemoryError::NotFound(id.to_string())))?;
        let mut next = current;
        f(&mut next);
        self.upsert(next, None)
    }

    pub fn link(&self, scope: Scope, from: &str, to: &str, rel: Rel) -> Result<String, OperationError> {
        let to = to.to_string();
        self.mutate_item("link", scope, from, move |item| {
            item.links.push(mem_model::Link { to, rel });
        })
    }

    pub fn pin(&self, scope: Scope, id: &str) -> Result<String, OperationError> {
        self.mutate_item("pin", scope, id, |item| item.quality.pinned = true)
    }

    pub fn unpin(&self, scope: Scope, id: &str) -> Result<String, OperationError> {
        self.mutate_item("unpin", scope, id, |item| item.quality.pinned = false)
    }

    pub fn tag(&self, scope: Scope, id: &str, add: &[String], remove: &[String]) -> Result<String, OperationError> {
        let add = add.to_vec();
        let remove = remove.to_vec();
        self.mutate_item("tag", scope, id, move |item| {
            for tag in add {
                item.facets.tags.insert(tag);
            }
            for tag in &remove {
                item.facets.tags.remove(tag);
            }
        })
    }

    /// Nudges `quality.confidence` toward 1.0 on positive feedback, toward
    /// 0.0 on negative, and always increments `reuse_count` (distinct from
    /// [`MemoryManager::mark_used`], which tracks raw retrieval usage rather
    /// than a judged outcome).
    pub fn feedback(&self, scope: Scope, id: &str, helpful: bool) -> Result<String, OperationError> {
        self.mutate_item("feedback", scope, id, move |item| {
            let target = if helpful { 1.0 } else { 0.0 };
            item.quality.confidence = (item.quality.confidence + (target - item.quality.confidence) * 0.2).clamp(0.0, 1.0);
            item.quality.reuse_count += 1;
        })
    }

    pub fn mark_used(&self, scope: Scope, id: &str) -> Result<String, OperationError> {
        self.mutate_item("use", scope, id, |item| item.quality.reuse_count += 1)
    }

    /// Hybrid BM25+vector query across every currently open scope the
    /// filters allow (`spec.md` §4.11).
    pub fn query(&self, query: Query) -> Result<QueryResult, OperationError> {
        let op = "query";
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        let targets: Vec<Scope> = match query.filters.scope {
            Some(s) => vec![s],
            None => scopes.keys().copied().collect(),
        };
        if targets.is_empty() {
            return Ok(QueryResult { items: vec![], scores: vec![], facets: QueryFacets::default(), context_pack: None });
        }

        let candidate_k = targets
            .iter()
            .filter_map(|s| scopes.get(s))
            .map(|h| h.config.rank.candidate_multiplier * query.k.max(1))
            .max()
            .unwrap_or(query.k.max(1));

        let tokens = mem_bm25::tokenize(&query.text);
        let mut bm25_hits = Vec::new();
        let mut vector_hits = Vec::new();
        let mut mean_idf_sum = 0.0f32;
        let mut oov_sum = 0.0f32;
        let mut scope_count = 0u32;

        for scope in &targets {
            let Some(handle) = scopes.get(scope) else { continue };
            let bm25 = handle.bm25.read().unwrap_or_else(|e| e.into_inner());
            for hit in bm25.search(&query.text, candidate_k) {
                bm25_hits.push(ScoredCandidate { id: hit.id, score: hit.score });
            }

            if !tokens.is_empty() {
                let idf_sum: f32 = tokens.iter().map(|t| bm25.idf_of(t)).sum();
                let oov = tokens.iter().filter(|t| !bm25.contains_token(t)).count() as f32 / tokens.len() as f32;
                mean_idf_sum += idf_sum / tokens.len() as f32;
                oov_sum += oov;
                scope_count += 1;
            }
            drop(bm25);

            if let Some(embedding) = &query.embedding {
                let vector_guard = handle.vector.read().unwrap_or_else(|e| e.into_inner());
                if let Some(index) = vector_guard.as_ref() {
                    if index.dimension() == embedding.len() {
                        for hit in index.search(embedding, candidate_k).unwrap_or_default() {
                            vector_hits.push(ScoredCandidate { id: hit.id, score: hit.cosine });
                        }
                    }
                }
            }
        }

        let (mean_idf, oov_rate) = if scope_count > 0 {
            (mean_idf_sum / scope_count as f32, oov_sum / scope_count as f32)
        } else {
            (0.0, 1.0)
        };

        let rank_config = targets
            .iter()
            .filter_map(|s| scopes.get(s))
            .next()
            .map(|h| h.config.rank)
            .unwrap_or_default();
        let alpha = compute_alpha(mean_idf, oov_rate, &rank_config);
        let fused = fuse_candidates(&bm25_hits, &vector_hits, alpha, candidate_k);

        // Late materialization: fetch full items only for the fused
        // candidate set, then apply filters that need full item bodies.
        let fused_ids: Vec<String> = fused.iter().map(|f| f.id.clone()).collect();
        let mut materialized: Vec<(MemoryItem, f32)> = Vec::new();
        for scope in &targets {
            let Some(handle) = scopes.get(scope) else { continue };
            let items = handle
                .backend
                .read_items(&fused_ids)
                .map_err(|e| OperationError::new(op, scope_dir_name(*scope), e.into()))?;
            for fused_hit in &fused {
                if let Some(Some(item)) = items.get(&fused_hit.id) {
                    if query.filters.matches(item) {
                        materialized.push((item.clone(), fused_hit.score));
                    }
                }
            }
        }
        materialized.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        materialized.dedup_by(|a, b| a.0.id == b.0.id);
        materialized.retain(|(_, score)| *score >= query.filters.min_score);
        materialized.truncate(query.k);

        let items: Vec<MemoryItem> = materialized.iter().map(|(item, _)| item.clone()).collect();
        let scores: Vec<f32> = materialized.iter().map(|(_, score)| *score).collect();
        let facets = QueryFacets::from_items(&items);
        let context_pack = match query.return_mode {
            ReturnMode::ContextPack { budget_chars } => Some(build_context_pack(&items, budget_chars)),
            ReturnMode::Items => None,
        };

        Ok(QueryResult { items, scores, facets, context_pack })
    }

    /// Re-derive the backend's catalog (and any item bytes recoverable only
    /// from the journal) from a full journal replay, then rebuild BM25 from
    /// the recovered catalog's full items; scoring-identical to a fresh
    /// index over the same corpus (`spec.md` §8 scenario 4).
    pub fn rebuild(&self, scope: Scope) -> Result<(), OperationError> {
        let op = "rebuild";
        self.with_scope(op, scope, |handle| {
            handle.set_state(ScopeState::Maintaining);
            let result = (|| {
                match handle.backend.rebuild_from_journal() {
                    Ok(()) => {}
                    Err(StorageError::Unsupported(_)) => {}
                    Err(e) => return Err(MemoryError::Storage(e)),
                }
                let ids = handle.backend.list_items()?;
                let items_map = handle.backend.read_items(&ids)?;
                let items: Vec<MemoryItem> = items_map.into_values().flatten().collect();
                handle.bm25.write().unwrap_or_else(|e| e.into_inner()).rebuild(&items);
                Ok(())
            })();
            handle.set_state(ScopeState::Ready);
            result
        })
    }

    /// Walk the journal's hash chain; a broken chain leaves the scope in
    /// `MAINTAINING` rather than `READY` until an operator runs `rebuild`
    /// (`spec.md` §7).
    pub fn verify(&self, scope: Scope) -> Result<VerifyReport, OperationError> {
        let op = "verify";
        self.with_scope(op, scope, |handle| {
            handle.set_state(ScopeState::Maintaining);
            let report = handle.backend.verify()?;
            if report.valid {
                handle.set_state(ScopeState::Ready);
            } else {
                tracing::error!(scope = scope_dir_name(scope), broken_at = ?report.broken_at, "journal integrity check failed");
            }
            Ok(report)
        })
    }

    /// Snapshot the catalog into the journal. Shares `compact`'s
    /// implementation since the journal exposes no lighter-weight
    /// snapshot-only primitive.
    pub fn snapshot(&self, scope: Scope) -> Result<PathBuf, OperationError> {
        self.compact(scope)
    }

    pub fn compact(&self, scope: Scope) -> Result<PathBuf, OperationError> {
        let op = "compact";
        self.with_scope(op, scope, |handle| {
            handle.set_state(ScopeState::Maintaining);
            let result = handle.backend.compact();
            handle.set_state(ScopeState::Ready);
            Ok(result?)
        })
    }

    pub fn scope_root_path(&self, scope: Scope) -> PathBuf {
        self.scope_root(scope)
    }
}

#[cfg(test)]
mod tests {
    use mem_model::{Facets, MemoryItemType, Quality, Security, Sensitivity};
    use tempfile::TempDir;

    use super::*;

    fn new_item(scope: Scope, title: &str) -> MemoryItem {
        let now = Utc::now();
        MemoryItem {
            id: String::new(),
            item_type: MemoryItemType::Note,
            scope,
            title: title.to_string(),
            text: None,
            code: None,
            language: None,
            facets: Facets::default(),
            context: Default::default(),
            quality: Quality::default(),
            security: Security::default(),
            links: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn manager(dir: &TempDir) -> MemoryManager {
        MemoryManager::new(dir.path(), "tester@1")
    }

    #[test]
    fn write_rejected_while_scope_is_not_ready_reports_conflict() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.open_scope(Scope::Local, ScopeConfig::default()).unwrap();

        {
            let scopes = mgr.scopes.read().unwrap();
            let handle = scopes.get(&Scope::Local).unwrap();
            handle.set_state(ScopeState::Maintaining);
        }
        let err = mgr.upsert(new_item(Scope::Local, "x"), None).unwrap_err();
        assert!(matches!(err.source, MemoryError::Conflict(ScopeState::Maintaining)));
    }

    #[test]
    fn empty_body_is_rejected_as_config_error() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.open_scope(Scope::Local, ScopeConfig::default()).unwrap();

        let err = mgr.upsert(new_item(Scope::Local, ""), None).unwrap_err();
        assert!(matches!(err.source, MemoryError::ConfigError(_)));
    }

    #[test]
    fn open_scope_rejects_out_of_range_video_crf() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let mut config = ScopeConfig { storage: crate::config::StorageConfig { backend: StorageBackendKind::Video, ..Default::default() }, ..Default::default() };
        config.video.crf = 99;

        let err = mgr.open_scope(Scope::Local, config).unwrap_err();
        assert!(matches!(err.source, MemoryError::ConfigError(_)));
    }

    #[test]
    fn sensitivity_default_applies_to_new_items_without_explicit_sensitivity() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let config = ScopeConfig { security: crate::config::SecurityConfig { sensitivity_default: Sensitivity::Private, secret_redaction: false }, ..Default::default() };
        mgr.open_scope(Scope::Local, config).unwrap();

        let id = mgr.upsert(new_item(Scope::Local, "note"), None).unwrap();
        let stored = mgr.get(&id, Some(Scope::Local)).unwrap().unwrap();
        assert_eq!(stored.security.sensitivity, Sensitivity::Private);
    }

    #[test]
    fn secret_redaction_scrubs_vendor_tokens_from_text_and_code() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let config = ScopeConfig { security: crate::config::SecurityConfig { secret_redaction: true, ..Default::default() }, ..Default::default() };
        mgr.open_scope(Scope::Local, config).unwrap();

        let mut item = new_item(Scope::Local, "creds");
        item.text = Some("token=ghp_abc123def456".to_string());
        let id = mgr.upsert(item, None).unwrap();

        let stored = mgr.get(&id, Some(Scope::Local)).unwrap().unwrap();
        assert_eq!(stored.text.as_deref(), Some("token=<REDACTED>"));
    }
}
