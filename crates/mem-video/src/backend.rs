//! The video-coded storage backend (`spec.md` §4.8): items are QR-encoded,
//! muxed into one consolidated MP4 per scope, and looked up through a
//! content-hash manifest plus the `.mvi` frame index. Implements the same
//! [`StorageBackend`] trait `mem-storage`'s `FileBackend` does, so the
//! Memory Manager never has to know which one it is talking to.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use lru::LruCache;
use serde_json::json;

use mem_journal::{Catalog, Journal};
use mem_model::{BackendKind, JournalOp, MemoryItem, MemoryItemSummary, PayloadRef, VideoSegmentManifestEntry};
use mem_qr::{QrEncodeOptions, QrFrame};
use mem_storage::{BackendStats, IndexUpdateCallback, StorageBackend, StorageError};

use crate::codec::{select_codec, EncodeOptions, VideoCodec};
use crate::error::VideoError;
use crate::frame_index::{self, FrameIndexReader};
use crate::manifest::VideoManifest;

/// After this many consecutive consolidation failures for the same id, the
/// item is excluded from every future consolidation attempt and reported as
/// a fatal per-item error rather than retried forever (`spec.md` §4.8/§7).
const MAX_ENCODE_ATTEMPTS: u32 = 3;

/// How many frames on either side of a target frame the read-recovery path
/// will probe before giving up, per the "bounded neighboring-frame probe"
/// recovery strategy in `spec.md` §4.8.
const NEIGHBOR_PROBE_RADIUS: u32 = 3;

const DEFAULT_PAYLOAD_CACHE_ENTRIES: usize = 4096;

#[derive(Clone)]
struct PendingWrite {
    item: MemoryItem,
    serialized_bytes: Vec<u8>,
    content_hash: String,
}

struct State {
    manifest: VideoManifest,
    pending_writes: BTreeMap<String, PendingWrite>,
    pending_deletes: BTreeSet<String>,
    encode_failures: BTreeMap<String, u32>,
}

pub struct VideoBackend {
    root: PathBuf,
    journal: Journal,
    catalog: Catalog,
    codec: Box<dyn VideoCodec>,
    callback: RwLock<Option<IndexUpdateCallback>>,
    actor: String,
    options: EncodeOptions,
    qr_options: QrEncodeOptions,
    state: Mutex<State>,
    consolidate_lane: parking_lot::Mutex<()>,
    cache: Mutex<LruCache<String, Vec<u8>>>,
}

impl VideoBackend {
    /// Open (or resume) a scope's video backend. Recovers any pending writes
    /// a crash left stranded between their journal append and the next
    /// successful consolidation by replaying the journal and cross-checking
    /// content hashes against the persisted manifest.
    pub fn open(
        root: impl Into<PathBuf>,
        actor: impl Into<String>,
        fsync_batch: usize,
        options: EncodeOptions,
        qr_options: QrEncodeOptions,
    ) -> Result<Self, VideoError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| VideoError::io("video.open.mkdir", e))?;

        let journal = Journal::open(root.join("journal.ndjson"), fsync_batch)?;
        let catalog = Catalog::open(root.join("catalog.json"))?;
        let manifest = VideoManifest::load(&root.join("manifest.json"))?;

        let codec = select_codec()?.ok_or(VideoError::NoCodecAvailable)?;
        codec.initialize()?;

        let (pending_writes, pending_deletes) = recover_pending(&journal, &catalog, &manifest)?;

        Ok(Self {
            root,
            journal,
            catalog,
            codec,
            callback: RwLock::new(None),
            actor: actor.into(),
            options,
            qr_options,
            state: Mutex::new(State {
                manifest,
                pending_writes,
                pending_deletes,
                encode_failures: BTreeMap::new(),
            }),
            consolidate_lane: parking_lot::Mutex::new(()),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_PAYLOAD_CACHE_ENTRIES).expect("nonzero constant"),
            )),
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn notify(&self, upserted: Vec<MemoryItem>, deleted: Vec<String>) {
        if let Some(cb) = self.callback.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            cb(upserted, deleted);
        }
    }

    fn mp4_path(&self) -> PathBuf {
        self.root.join("consolidated.mp4")
    }

    fn mvi_path(&self) -> PathBuf {
        self.root.join("consolidated.mvi")
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Fetch the raw (pre-deserialize) bytes for a content hash, consulting
    /// the payload cache first, then the pending-writes buffer, then the
    /// consolidated segment. `spec.md` §4.8 read path steps 3-5.
    fn materialize_content_hash(&self, content_hash: &str) -> Result<Vec<u8>, VideoError> {
        if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(content_hash) {
            return Ok(cached.clone());
        }

        let (manifest, pending_bytes) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let pending_bytes = state
                .pending_writes
                .values()
                .find(|pw| pw.content_hash == content_hash)
                .map(|pw| pw.serialized_bytes.clone());
            (state.manifest.clone(), pending_bytes)
        };

        if let Some(bytes) = pending_bytes {
            self.cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .put(content_hash.to_string(), bytes.clone());
            return Ok(bytes);
        }

        let entry = manifest
            .get(content_hash)
            .ok_or(VideoError::HashMismatch)?
            .clone();
        let mp4_bytes = std::fs::read(self.mp4_path()).map_err(|e| VideoError::io("video.read_item.mp4", e))?;
        let reader = FrameIndexReader::open(&self.mvi_path())?;
        let frames = self.decode_frame_range(
            &mp4_bytes,
            &reader,
            entry.first_frame,
            entry.last_frame,
            manifest.frame_width,
            manifest.frame_height,
        )?;
        let raw = mem_qr::decode(&frames)?;

        let item: MemoryItem = serde_json::from_slice(&raw)?;
        if item.content_hash() != content_hash {
            return Err(VideoError::HashMismatch);
        }

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(content_hash.to_string(), raw.clone());
        Ok(raw)
    }

    fn decode_frame_range(
        &self,
        mp4_bytes: &[u8],
        reader: &FrameIndexReader,
        first: u32,
        last: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<QrFrame>, VideoError> {
        let mut out = Vec::with_capacity((last.saturating_sub(first) + 1) as usize);
        for n in first..=last {
            out.push(self.decode_one_frame_with_recovery(mp4_bytes, reader, n, width, height)?);
        }
        Ok(out)
    }

    /// Recovery ladder for one frame: direct decode, then keyframe-then-scan,
    /// then a bounded neighboring-frame probe (`spec.md` §4.8 read path step
    /// 6). Returns the first error encountered if every strategy fails.
    fn decode_one_frame_with_recovery(
        &self,
        mp4_bytes: &[u8],
        reader: &FrameIndexReader,
        n: u32,
        width: u32,
        height: u32,
    ) -> Result<QrFrame, VideoError> {
        match self.codec.decode_frame(mp4_bytes, reader, n, width, height) {
            Ok(frame) => return Ok(frame),
            Err(first_err) => {
                tracing::warn!(frame = n, error = %first_err, "frame decode failed, attempting recovery");

                if let Some(keyframe) = reader.find_nearest_keyframe(n) {
                    let mut probe = keyframe.frame_number;
                    while probe <= n {
                        if probe == n {
                            if let Ok(frame) = self.codec.decode_frame(mp4_bytes, reader, probe, width, height) {
                                return Ok(frame);
                            }
                        }
                        probe += 1;
                    }
                }

                for delta in 1..=NEIGHBOR_PROBE_RADIUS {
                    for candidate in [n.checked_sub(delta), Some(n + delta)].into_iter().flatten() {
                        if candidate as usize >= reader.len() {
                            continue;
                        }
                        if candidate == n {
                            if let Ok(frame) = self.codec.decode_frame(mp4_bytes, reader, candidate, width, height) {
                                return Ok(frame);
                            }
                        }
                    }
                }

                tracing::error!(frame = n, "frame unrecoverable after contrast/keyframe/neighbor retries");
                Err(first_err)
            }
        }
    }

    fn record_encode_failure(&self, id: &str) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let attempts = state.encode_failures.entry(id.to_string()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    fn clear_encode_failure(&self, id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.encode_failures.remove(id);
    }

    fn is_quarantined(&self, id: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.encode_failures.get(id).is_some_and(|n| *n >= MAX_ENCODE_ATTEMPTS)
    }

    /// Single-writer, exclusive: rebuild the whole segment from the current
    /// live set. `spec.md` §4.8 consolidation steps 1-6. Leaves the existing
    /// `consolidated.mp4`/`.mvi`/manifest untouched on any failure (all new
    /// output goes to temp files until the final atomic renames).
    fn consolidate(&self) -> Result<(), VideoError> {
        let _lane = self.consolidate_lane.lock();

        let (pending_writes, pending_deletes, old_manifest) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (state.pending_writes.clone(), state.pending_deletes.clone(), state.manifest.clone())
        };
        if pending_writes.is_empty() && pending_deletes.is_empty() {
            return Ok(());
        }

        let live_ids = self.catalog.ids();
        let old_mp4_bytes = std::fs::read(self.mp4_path()).unwrap_or_default();
        let old_frame_reader = FrameIndexReader::open(&self.mvi_path()).ok();

        let mut per_hash_frames: BTreeMap<String, Vec<QrFrame>> = BTreeMap::new();
        let mut uncompressed_sizes: BTreeMap<String, u64> = BTreeMap::new();
        let mut ordered_hashes: Vec<String> = Vec::new();
        let mut max_w = 0u32;
        let mut max_h = 0u32;

        for id in &live_ids {
            if self.is_quarantined(id) {
                continue;
            }
            let Some(summary) = self.catalog.get(id) else { continue };
            let hash = summary.content_hash.clone();
            if per_hash_frames.contains_key(&hash) {
                continue;
            }

            let attempt: Result<(Vec<u8>, Vec<QrFrame>), VideoError> = (|| {
                let bytes = if let Some(pw) = pending_writes.get(id) {
                    pw.serialized_bytes.clone()
                } else if let Some(entry) = old_manifest.get(&hash) {
                    let reader = old_frame_reader.as_ref().ok_or(VideoError::HashMismatch)?;
                    let frames = self.decode_frame_range(
                        &old_mp4_bytes,
                        reader,
                        entry.first_frame,
                        entry.last_frame,
                        old_manifest.frame_width,
                        old_manifest.frame_height,
                    )?;
                    mem_qr::decode(&frames)?
                } else {
                    return Err(VideoError::HashMismatch);
                };
                let frames = mem_qr::encode_with_options(&bytes, &self.qr_options)?;
                Ok((bytes, frames))
            })();

            match attempt {
                Ok((bytes, frames)) => {
                    for f in &frames {
                        max_w = max_w.max(f.width);
                        max_h = max_h.max(f.height);
                    }
                    uncompressed_sizes.insert(hash.clone(), bytes.len() as u64);
                    per_hash_frames.insert(hash.clone(), frames);
                    ordered_hashes.push(hash.clone());
                    self.clear_encode_failure(id);
                }
                Err(e) => {
                    let attempts = self.record_encode_failure(id);
                    if attempts >= MAX_ENCODE_ATTEMPTS {
                        tracing::error!(id, attempts, error = %e, "item quarantined after repeated encode failures");
                    } else {
                        tracing::warn!(id, attempts, error = %e, "consolidation encode failed, will retry");
                    }
                }
            }
        }

        let mut all_frames = Vec::new();
        let mut new_entries = Vec::new();
        for hash in &ordered_hashes {
            let frames = &per_hash_frames[hash];
            let first_frame = all_frames.len() as u32;
            for f in frames {
                all_frames.push(pad_frame(f, max_w, max_h));
            }
            let last_frame = all_frames.len() as u32 - 1;
            new_entries.push(VideoSegmentManifestEntry {
                content_hash: hash.clone(),
                first_frame,
                last_frame,
                uncompressed_size: uncompressed_sizes[hash],
                chunk_count: frames.len() as u32,
            });
        }

        let (bytes, frame_index, new_w, new_h) = if all_frames.is_empty() {
            (Vec::new(), Vec::new(), 0, 0)
        } else {
            let encoded = self.codec.encode(&all_frames, &self.options)?;
            (encoded.bytes, encoded.frame_index, max_w, max_h)
        };

        let tmp_mp4 = self.root.join("consolidated.mp4.tmp");
        let tmp_mvi = self.root.join("consolidated.mvi.tmp");
        std::fs::write(&tmp_mp4, &bytes).map_err(|e| VideoError::io("consolidate.write_mp4_tmp", e))?;
        frame_index::write(&tmp_mvi, &frame_index)?;

        std::fs::rename(&tmp_mp4, self.mp4_path()).map_err(|e| VideoError::io("consolidate.rename_mp4", e))?;
        std::fs::rename(&tmp_mvi, self.mvi_path()).map_err(|e| VideoError::io("consolidate.rename_mvi", e))?;

        let new_manifest = VideoManifest {
            entries: new_entries,
            frame_width: new_w,
            frame_height: new_h,
        };
        new_manifest.write(&self.manifest_path())?;

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.manifest = new_manifest;
            state.pending_writes.clear();
            state.pending_deletes.clear();
        }

        tracing::info!(frame_count = all_frames.len(), segment_hashes = ordered_hashes.len(), "segment consolidated");
        Ok(())
    }
}

fn pad_frame(frame: &QrFrame, canvas_width: u32, canvas_height: u32) -> QrFrame {
    if frame.width == canvas_width && frame.height == canvas_height {
        return frame.clone();
    }
    let mut rgba = vec![255u8; (canvas_width as usize) * (canvas_height as usize) * 4];
    for y in 0..frame.height {
        let src_start = (y * frame.width * 4) as usize;
        let src_end = src_start + (frame.width * 4) as usize;
        let dst_start = (y * canvas_width * 4) as usize;
        let dst_end = dst_start + (frame.width * 4) as usize;
        rgba[dst_start..dst_end].copy_from_slice(&frame.rgba[src_start..src_end]);
    }
    QrFrame::new(canvas_width, canvas_height, rgba)
}

/// Reconstruct in-memory pending state from the journal: any upsert whose
/// content hash isn't yet reflected in the persisted manifest is still
/// owed a consolidation; any delete whose id the catalog no longer carries
/// is still owed removal from the next segment.
fn recover_pending(
    journal: &Journal,
    catalog: &Catalog,
    manifest: &VideoManifest,
) -> Result<(BTreeMap<String, PendingWrite>, BTreeSet<String>), VideoError> {
    let outcome = journal.replay(None)?;
    let mut pending_writes: BTreeMap<String, PendingWrite> = BTreeMap::new();
    let mut pending_deletes: BTreeSet<String> = BTreeSet::new();

    for entry in outcome.entries {
        match entry.op {
            JournalOp::Upsert => {
                pending_deletes.remove(&entry.id);
                let Some(hash) = entry.content_hash.clone() else { continue };
                if manifest.get(&hash).is_some() {
                    pending_writes.remove(&entry.id);
                    continue;
                }
                if let Some(meta) = entry.meta.as_ref().and_then(|m| m.get("item").cloned()) {
                    if let Ok(item) = serde_json::from_value::<MemoryItem>(meta) {
                        let serialized_bytes = serde_json::to_vec(&item).unwrap_or_default();
                        pending_writes.insert(
                            entry.id.clone(),
                            PendingWrite { item, serialized_bytes, content_hash: hash },
                        );
                    }
                }
            }
            JournalOp::Delete => {
                pending_writes.remove(&entry.id);
                pending_deletes.insert(entry.id.clone());
            }
            JournalOp::Link | JournalOp::Snapshot => {}
        }
    }

    pending_deletes.retain(|id| !catalog.contains(id));
    Ok((pending_writes, pending_deletes))
}

impl StorageBackend for VideoBackend {
    fn write_item(&self, item: &MemoryItem) -> Result<(), StorageError> {
        item.validate().map_err(|e| StorageError::Config(e.to_string()))?;
        let content_hash = item.content_hash();

        if let Some(mut existing) = self.catalog.get(&item.id) {
            if existing.content_hash == content_hash {
                tracing::debug!(id = %item.id, "write_item no-op: content hash unchanged");
                existing.updated_at = item.updated_at;
                self.catalog.upsert(existing);
                self.catalog.persist().map_err(VideoError::from)?;
                return Ok(());
            }
        }

        let bytes = serde_json::to_vec(item).map_err(VideoError::from)?;

        self.journal
            .append(
                JournalOp::Upsert,
                item.id.clone(),
                Some(content_hash.clone()),
                self.actor.clone(),
                Some(json!({ "item": item })),
            )
            .map_err(VideoError::from)?;

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.pending_deletes.remove(&item.id);
            let already_consolidated = state.manifest.get(&content_hash).is_some();
            if already_consolidated {
                state.pending_writes.remove(&item.id);
            } else {
                state.pending_writes.insert(
                    item.id.clone(),
                    PendingWrite {
                        item: item.clone(),
                        serialized_bytes: bytes.clone(),
                        content_hash: content_hash.clone(),
                    },
                );
            }
        }

        let summary = MemoryItemSummary::from_item(item, content_hash, bytes.len() as u64);
        self.catalog.upsert(summary);
        self.catalog.persist().map_err(VideoError::from)?;

        tracing::info!(id = %item.id, version = item.version, "item written (video backend)");
        self.notify(vec![item.clone()], vec![]);
        self.consolidate().map_err(StorageError::from)?;
        Ok(())
    }

    fn read_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError> {
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(pw) = state.pending_writes.get(id) {
                return Ok(Some(pw.item.clone()));
            }
            if state.pending_deletes.contains(id) {
                return Ok(None);
            }
        }
        let Some(summary) = self.catalog.get(id) else {
            return Ok(None);
        };
        let bytes = self.materialize_content_hash(&summary.content_hash).map_err(StorageError::from)?;
        let item: MemoryItem = serde_json::from_slice(&bytes).map_err(StorageError::from)?;
        Ok(Some(item))
    }

    fn delete_item(&self, id: &str) -> Result<bool, StorageError> {
        if !self.catalog.contains(id) {
            return Ok(false);
        }
        self.journal
            .append(JournalOp::Delete, id.to_string(), None, self.actor.clone(), None)
            .map_err(VideoError::from)?;

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.pending_writes.remove(id);
            state.pending_deletes.insert(id.to_string());
        }
        self.catalog.remove(id);
        self.catalog.persist().map_err(VideoError::from)?;

        tracing::info!(id, "item deleted (video backend)");
        self.notify(vec![], vec![id.to_string()]);
        self.consolidate().map_err(StorageError::from)?;
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

    fn list_summaries(&self, limit: Option<usize>) -> Result<Vec<mem_model::MemoryItemSummary>, StorageError> {
        Ok(self.catalog.list(limit))
    }

    fn has_content(&self, hashes: &[String]) -> Result<BTreeMap<String, bool>, StorageError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(hashes
            .iter()
            .map(|h| {
                let present = state.manifest.get(h).is_some() || state.pending_writes.values().any(|pw| &pw.content_hash == h);
                (h.clone(), present)
            })
            .collect())
    }

    fn get_by_hash(&self, hashes: &[String]) -> Result<BTreeMap<String, PayloadRef>, StorageError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = BTreeMap::new();
        for hash in hashes {
            if let Some(entry) = state.manifest.get(hash) {
                out.insert(
                    hash.clone(),
                    PayloadRef {
                        content_hash: hash.clone(),
                        backend: BackendKind::Video,
                        segment_id: Some("consolidated".to_string()),
                        frame_start: Some(entry.first_frame),
                        frame_end: Some(entry.last_frame),
                    },
                );
            } else if state.pending_writes.values().any(|pw| &pw.content_hash == hash) {
                out.insert(
                    hash.clone(),
                    PayloadRef {
                        content_hash: hash.clone(),
                        backend: BackendKind::Video,
                        segment_id: None,
                        frame_start: None,
                        frame_end: None,
                    },
                );
            }
        }
        Ok(out)
    }

    fn register_index_update(&self, callback: IndexUpdateCallback) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    fn stats(&self) -> Result<BackendStats, StorageError> {
        let mp4_len = std::fs::metadata(self.mp4_path()).map(|m| m.len()).unwrap_or(0);
        let mvi_len = std::fs::metadata(self.mvi_path()).map(|m| m.len()).unwrap_or(0);
        Ok(BackendStats {
            item_count: self.catalog.len() as u64,
            bytes: mp4_len + mvi_len,
        })
    }

    fn cleanup(&self) -> Result<u64, StorageError> {
        let mut reclaimed = 0u64;
        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let is_tmp = entry.path().extension().is_some_and(|ext| ext == "tmp");
                if is_tmp {
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

    /// Re-derive the catalog and pending-write/-delete buffers from a full
    /// journal replay, e.g. after `catalog.json` was deleted out-of-band.
    /// Item bytes themselves never live outside the journal/manifest for
    /// this backend, so there is nothing to rewrite on disk beyond the
    /// catalog projection and the in-memory pending state; a subsequent
    /// `write_item` (or the next scheduled consolidation) flushes pending
    /// writes into the segment as usual.
    fn rebuild_from_journal(&self) -> Result<(), StorageError> {
        let outcome = self.journal.replay(None).map_err(VideoError::from)?;
        let mut rebuilt = BTreeMap::new();
        for entry in &outcome.entries {
            match entry.op {
                JournalOp::Upsert => {
                    let Some(item_value) = entry.meta.as_ref().and_then(|m| m.get("item").cloned()) else {
                        continue;
                    };
                    let Ok(item) = serde_json::from_value::<MemoryItem>(item_value) else {
                        continue;
                    };
                    let hash = entry.content_hash.clone().unwrap_or_else(|| item.content_hash());
                    let size = serde_json::to_vec(&item).map(|b| b.len() as u64).unwrap_or(0);
                    rebuilt.insert(entry.id.clone(), MemoryItemSummary::from_item(&item, hash, size));
                }
                JournalOp::Delete => {
                    rebuilt.remove(&entry.id);
                }
                JournalOp::Link | JournalOp::Snapshot => {}
            }
        }
        self.catalog.replace_all(rebuilt);
        self.catalog.persist().map_err(VideoError::from)?;

        let manifest = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.manifest.clone()
        };
        let (pending_writes, pending_deletes) = recover_pending(&self.journal, &self.catalog, &manifest).map_err(StorageError::from)?;
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.pending_writes = pending_writes;
            state.pending_deletes = pending_deletes;
        }
        tracing::info!("video backend catalog and pending state rebuilt from journal replay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mem_model::{Facets, MemoryItemType, Quality, Scope, Security};
    use tempfile::tempdir;

    fn sample_item(id: &str, body: &str) -> MemoryItem {
        MemoryItem {
            id: id.to_string(),
            item_type: MemoryItemType::Snippet,
            scope: Scope::Local,
            title: "api call".to_string(),
            text: Some(body.to_string()),
            code: None,
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
        let backend = VideoBackend::open(dir.path(), "tester@1", 1, EncodeOptions::default(), QrEncodeOptions::default()).unwrap();
        let item = sample_item("id-1", "hello world");
        backend.write_item(&item).unwrap();

        let read_back = backend.read_item(&item.id).unwrap().unwrap();
        assert_eq!(read_back, item);
        assert!(dir.path().join("consolidated.mp4").exists());
        assert!(dir.path().join("consolidated.mvi").exists());
    }

    #[test]
    fn dedup_across_ids_shares_one_manifest_entry() {
        let dir = tempdir().unwrap();
        let backend = VideoBackend::open(dir.path(), "tester@1", 1, EncodeOptions::default(), QrEncodeOptions::default()).unwrap();
        backend.write_item(&sample_item("i1", "hello")).unwrap();
        backend.write_item(&sample_item("i2", "hello")).unwrap();

        let state = backend.state.lock().unwrap();
        assert_eq!(state.manifest.entries.len(), 1);
        drop(state);

        assert_eq!(backend.read_item("i1").unwrap().unwrap().text.as_deref(), Some("hello"));
        assert_eq!(backend.read_item("i2").unwrap().unwrap().text.as_deref(), Some("hello"));
    }

    #[test]
    fn delete_then_read_returns_absent() {
        let dir = tempdir().unwrap();
        let backend = VideoBackend::open(dir.path(), "tester@1", 1, EncodeOptions::default(), QrEncodeOptions::default()).unwrap();
        let item = sample_item("id-1", "body");
        backend.write_item(&item).unwrap();
        assert!(backend.delete_item(&item.id).unwrap());
        assert!(backend.read_item(&item.id).unwrap().is_none());
    }

    #[test]
    fn repeat_write_with_unchanged_content_hash_does_not_reconsolidate() {
        let dir = tempdir().unwrap();
        let backend = VideoBackend::open(dir.path(), "tester@1", 1, EncodeOptions::default(), QrEncodeOptions::default()).unwrap();
        let item = sample_item("id-1", "hello");
        backend.write_item(&item).unwrap();
        let mp4_len_before = std::fs::metadata(dir.path().join("consolidated.mp4")).unwrap().len();

        let mut revised_timestamp_only = item.clone();
        revised_timestamp_only.updated_at = item.updated_at + chrono::Duration::seconds(1);
        backend.write_item(&revised_timestamp_only).unwrap();

        let mp4_len_after = std::fs::metadata(dir.path().join("consolidated.mp4")).unwrap().len();
        assert_eq!(mp4_len_before, mp4_len_after);
        let summary = backend.catalog().get(&item.id).unwrap();
        assert_eq!(summary.updated_at, revised_timestamp_only.updated_at);
    }

    #[test]
    fn consolidation_of_empty_scope_is_a_no_op() {
        let dir = tempdir().unwrap();
        let backend = VideoBackend::open(dir.path(), "tester@1", 1, EncodeOptions::default(), QrEncodeOptions::default()).unwrap();
        assert!(backend.consolidate().is_ok());
        assert_eq!(backend.stats().unwrap().item_count, 0);
    }
}
