//! Advisory, file-based cross-process locks.
//!
//! A lock is a JSON file `{"pid": <u32>, "epoch_ms": <u64>}` created with
//! `O_EXCL` semantics. A lock older than [`STALE_AFTER_MS`] is considered
//! abandoned and is reclaimed — we can only cheaply verify liveness of our
//! *own* pid cross-platform without an extra dependency, so a foreign pid's
//! absence is inferred from age alone rather than a real `kill(pid, 0)`
//! probe. That matches the spec's "30s then reclaim" policy; it is advisory,
//! not a correctness mechanism.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const STALE_AFTER_MS: u64 = 30_000;

#[derive(Debug, Serialize, Deserialize)]
struct LockFile {
    pid: u32,
    epoch_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An acquired advisory lock; removes its file on drop.
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the advisory lock at `path`, reclaiming it first if it is older
/// than [`STALE_AFTER_MS`]. Returns [`StorageError::Busy`] if another holder
/// appears live.
pub fn acquire(path: &Path) -> Result<LockGuard, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io("lock.mkdir", e))?;
    }

    for _ in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let record = LockFile {
                    pid: std::process::id(),
                    epoch_ms: now_ms(),
                };
                let bytes = serde_json::to_vec(&record)?;
                file.write_all(&bytes)
                    .map_err(|e| StorageError::io("lock.write", e))?;
                return Ok(LockGuard { path: path.to_path_buf() });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(path) {
                    let _ = std::fs::remove_file(path);
                    continue;
                }
                return Err(StorageError::Busy);
            }
            Err(e) => return Err(StorageError::io("lock.create", e)),
        }
    }
    Err(StorageError::Busy)
}

fn is_stale(path: &Path) -> bool {
    let Ok(bytes) = std::fs::read(path) else {
        return true;
    };
    let Ok(record) = serde_json::from_slice::<LockFile>(&bytes) else {
        return true;
    };
    now_ms().saturating_sub(record.epoch_ms) > STALE_AFTER_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locks/write.lock");
        let guard = acquire(&path).unwrap();
        assert!(matches!(acquire(&path), Err(StorageError::Busy)));
        drop(guard);
        assert!(acquire(&path).is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locks/write.lock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let stale = LockFile {
            pid: u32::MAX,
            epoch_ms: 0,
        };
        std::fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();
        assert!(acquire(&path).is_ok());
    }
}
