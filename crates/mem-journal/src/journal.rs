//! Append-only hash-chained journal.
//!
//! Every line is a compact-JSON [`JournalEntry`]. `prev_hash` of record `k+1`
//! equals the SHA-256 hex digest of record `k`'s exact line bytes (no
//! trailing newline); the first record in a journal chains from
//! [`mem_model::genesis_prev_hash`]. This gives O(1) append-time chaining and
//! an O(n) [`Journal::verify`] that recomputes the whole chain from scratch.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use mem_model::{genesis_prev_hash, JournalEntry, JournalOp};

use crate::error::JournalError;

/// Result of a `replay` pass: entries read successfully, plus the byte
/// offset where reading stopped (if anything after it was unreadable).
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub entries: Vec<JournalEntry>,
    pub stopped_at: Option<u64>,
}

/// Result of a `verify` pass.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub valid: bool,
    pub checked: usize,
    pub broken_at: Option<u64>,
    pub truncated_at: Option<u64>,
    pub integrity_score: f64,
}

struct Line<'a> {
    offset: u64,
    bytes: &'a [u8],
    terminated: bool,
}

/// Split raw journal bytes into lines with their starting byte offsets.
/// The final line is marked `terminated: false` if the file doesn't end
/// with `\n` — that's the signature of a write that was cut off mid-record.
fn split_lines(data: &[u8]) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            if i > start {
                lines.push(Line {
                    offset: start as u64,
                    bytes: &data[start..i],
                    terminated: true,
                });
            }
            start = i + 1;
        }
    }
    if start < data.len() {
        lines.push(Line {
            offset: start as u64,
            bytes: &data[start..],
            terminated: false,
        });
    }
    lines
}

struct Inner {
    file: File,
    last_hash: String,
    writes_since_fsync: usize,
}

/// An append-only, hash-chained journal backed by a single NDJSON file.
pub struct Journal {
    path: PathBuf,
    fsync_batch: usize,
    halted: AtomicBool,
    broken_at: AtomicU64,
    inner: Mutex<Inner>,
}

const NO_BREAK: u64 = u64::MAX;

impl Journal {
    /// Open (creating if absent) the journal at `path`. Replays the existing
    /// file to recover `last_hash`; a trailing partial record is truncated
    /// to its last complete line, per recovery policy. A mid-chain break is
    /// not repaired here — it halts further appends until the caller runs
    /// explicit recovery (rebuild from a known-good snapshot).
    pub fn open(path: impl Into<PathBuf>, fsync_batch: usize) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let lines = split_lines(&data);
        let mut chain_hash = genesis_prev_hash();
        let mut halted_at = None;
        let mut last_good_end: u64 = 0;

        for line in &lines {
            if !line.terminated {
                // Trailing partial record: truncate the file to drop it.
                break;
            }
            match serde_json::from_slice::<JournalEntry>(line.bytes) {
                Ok(entry) if entry.prev_hash == chain_hash => {
                    chain_hash = mem_hash::hash_bytes(line.bytes);
                    last_good_end = line.offset + line.bytes.len() as u64 + 1;
                }
                _ => {
                    halted_at = Some(line.offset);
                    break;
                }
            }
        }

        if halted_at.is_none() {
            // Only ever truncate when the tail is a genuinely incomplete
            // write, i.e. the file is longer than the last good record end.
            if (last_good_end as usize) < data.len() {
                file.set_len(last_good_end)?;
                file.seek(SeekFrom::Start(last_good_end))?;
            }
        }

        let journal = Self {
            path,
            fsync_batch: fsync_batch.max(1),
            halted: AtomicBool::new(halted_at.is_some()),
            broken_at: AtomicU64::new(halted_at.unwrap_or(NO_BREAK)),
            inner: Mutex::new(Inner {
                file,
                last_hash: chain_hash,
                writes_since_fsync: 0,
            }),
        };
        if let Some(offset) = halted_at {
            tracing::warn!(offset, path = %journal.path.display(), "journal hash chain broken on open; writes halted");
        }
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Append one record, filling in `prev_hash` and `ts`. Fails with
    /// [`JournalError::JournalLocked`] if a prior `verify()` found the chain
    /// broken.
    pub fn append(
        &self,
        op: JournalOp,
        id: impl Into<String>,
        content_hash: Option<String>,
        actor: impl Into<String>,
        meta: Option<serde_json::Value>,
    ) -> Result<JournalEntry, JournalError> {
        if self.halted.load(Ordering::SeqCst) {
            let broken_at = self.broken_at.load(Ordering::SeqCst);
            let broken_at = if broken_at == NO_BREAK { 0 } else { broken_at };
            return Err(JournalError::JournalLocked { broken_at });
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = JournalEntry {
            op,
            id: id.into(),
            content_hash,
            prev_hash: inner.last_hash.clone(),
            ts: Utc::now(),
            actor: actor.into(),
            meta,
        };

        let mut line = serde_json::to_vec(&entry)?;
        let line_hash = mem_hash::hash_bytes(&line);
        line.push(b'\n');

        inner.file.write_all(&line).map_err(|e| {
            if e.raw_os_error() == Some(28) {
                JournalError::JournalFull(e.to_string())
            } else {
                JournalError::Io(e)
            }
        })?;

        inner.writes_since_fsync += 1;
        if inner.writes_since_fsync >= self.fsync_batch {
            inner.file.sync_data()?;
            inner.writes_since_fsync = 0;
        }
        inner.last_hash = line_hash;

        tracing::debug!(id = %entry.id, op = ?entry.op, "journal append");
        Ok(entry)
    }

    /// Force any buffered writes to disk regardless of the fsync batch size.
    pub fn flush(&self) -> Result<(), JournalError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file.sync_data()?;
        inner.writes_since_fsync = 0;
        Ok(())
    }

    /// Rebuild derived state by reading every complete record from
    /// `from_offset` (default 0) onward. Stops at the first unreadable
    /// record and reports its offset rather than erroring.
    pub fn replay(&self, from_offset: Option<u64>) -> Result<ReplayOutcome, JournalError> {
        let data = std::fs::read(&self.path)?;
        let start = from_offset.unwrap_or(0) as usize;
        let data = if start <= data.len() { &data[start..] } else { &[] };

        let mut entries = Vec::new();
        let mut stopped_at = None;
        for line in split_lines(data) {
            if !line.terminated {
                stopped_at = Some(from_offset.unwrap_or(0) + line.offset);
                break;
            }
            match serde_json::from_slice::<JournalEntry>(line.bytes) {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    stopped_at = Some(from_offset.unwrap_or(0) + line.offset);
                    break;
                }
            }
        }
        Ok(ReplayOutcome { entries, stopped_at })
    }

    /// Recompute the hash chain from scratch. A trailing partial record does
    /// not count as broken (it is reported via `truncated_at`); any break
    /// before the tail does, via `broken_at`, and halts future appends.
    pub fn verify(&self) -> Result<VerifyReport, JournalError> {
        let data = std::fs::read(&self.path)?;
        let lines = split_lines(&data);

        let mut chain_hash = genesis_prev_hash();
        let mut checked = 0usize;
        let mut broken_at = None;
        let mut truncated_at = None;
        let total = lines.len();

        for line in &lines {
            if !line.terminated {
                truncated_at = Some(line.offset);
                break;
            }
            match serde_json::from_slice::<JournalEntry>(line.bytes) {
                Ok(entry) if entry.prev_hash == chain_hash => {
                    chain_hash = mem_hash::hash_bytes(line.bytes);
                    checked += 1;
                }
                _ => {
                    broken_at = Some(line.offset);
                    break;
                }
            }
        }

        let valid = broken_at.is_none();
        self.halted.store(!valid, Ordering::SeqCst);
        self.broken_at
            .store(broken_at.unwrap_or(NO_BREAK), Ordering::SeqCst);

        let integrity_score = if total == 0 {
            1.0
        } else if valid {
            1.0
        } else {
            checked as f64 / total as f64
        };

        Ok(VerifyReport {
            valid,
            checked,
            broken_at,
            truncated_at,
            integrity_score,
        })
    }

    /// Write a snapshot record carrying `catalog_digest`, then move every
    /// prior record into an archive file and restart the live journal from
    /// just the snapshot — preserving the chain, since the snapshot's own
    /// line hash becomes the new file's effective prefix.
    pub fn compact(&self, catalog_digest: &str, actor: &str) -> Result<PathBuf, JournalError> {
        let snapshot = self.append(
            JournalOp::Snapshot,
            "catalog",
            Some(catalog_digest.to_string()),
            actor,
            None,
        )?;

        let archive_path = self.path.with_extension(format!(
            "ndjson.archive-{}",
            Utc::now().timestamp_millis()
        ));

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file.sync_data()?;
        drop(inner);

        std::fs::copy(&self.path, &archive_path)?;

        let snapshot_line = {
            let mut bytes = serde_json::to_vec(&snapshot)?;
            bytes.push(b'\n');
            bytes
        };
        let tmp_path = self.path.with_extension("ndjson.compact.tmp");
        std::fs::write(&tmp_path, &snapshot_line)?;
        std::fs::rename(&tmp_path, &self.path)?;

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;
        inner.file.seek(SeekFrom::End(0))?;
        inner.writes_since_fsync = 0;
        // last_hash is already the snapshot line's hash from the append above.
        drop(inner);

        tracing::info!(archive = %archive_path.display(), "journal compacted");
        Ok(archive_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn journal_at(dir: &Path) -> Journal {
        Journal::open(dir.join("journal.ndjson"), 1).unwrap()
    }

    #[test]
    fn append_chains_prev_hash() {
        let dir = tempdir().unwrap();
        let j = journal_at(dir.path());
        let e1 = j.append(JournalOp::Upsert, "a", Some("h1".into()), "tester@1", None).unwrap();
        assert_eq!(e1.prev_hash, genesis_prev_hash());
        let e2 = j.append(JournalOp::Upsert, "b", Some("h2".into()), "tester@1", None).unwrap();
        assert_ne!(e2.prev_hash, genesis_prev_hash());
    }

    #[test]
    fn verify_passes_on_untouched_journal() {
        let dir = tempdir().unwrap();
        let j = journal_at(dir.path());
        for i in 0..5 {
            j.append(JournalOp::Upsert, format!("id{i}"), Some(format!("h{i}")), "tester@1", None)
                .unwrap();
        }
        let report = j.verify().unwrap();
        assert!(report.valid);
        assert_eq!(report.checked, 5);
        assert_eq!(report.integrity_score, 1.0);
    }

    #[test]
    fn verify_detects_a_flipped_byte() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.ndjson");
        {
            let j = Journal::open(&path, 1).unwrap();
            for i in 0..5 {
                j.append(JournalOp::Upsert, format!("id{i}"), Some(format!("h{i}")), "tester@1", None)
                    .unwrap();
            }
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let third_line_start = bytes
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == b'\n')
            .nth(1)
            .map(|(i, _)| i + 1)
            .unwrap();
        // Flip a byte inside the third record's id field value.
        let flip_at = third_line_start + 20;
        bytes[flip_at] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let j = Journal::open(&path, 1).unwrap();
        let report = j.verify().unwrap();
        assert!(!report.valid);
        assert!(report.broken_at.is_some());
        assert!(j.is_halted());
    }

    #[test]
    fn replay_stops_at_trailing_partial_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.ndjson");
        let j = Journal::open(&path, 1).unwrap();
        j.append(JournalOp::Upsert, "a", Some("h1".into()), "tester@1", None).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"op\":\"upsert\",\"id\":\"broken").unwrap();

        let outcome = j.replay(None).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.stopped_at.is_some());
    }
}
