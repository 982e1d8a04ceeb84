//! Journal record shape. See `mem-journal` for append/replay/verify logic;
//! this crate only owns the record's data shape so every crate that needs to
//! read a journal line (storage backends, the manager) shares one type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `prev_hash` is always 64 hex characters (a SHA-256 digest).
pub const PREV_HASH_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    Upsert,
    Delete,
    Link,
    Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub op: JournalOp,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub prev_hash: String,
    pub ts: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// `prev_hash` of the very first record appended to an empty journal.
pub fn genesis_prev_hash() -> String {
    "0".repeat(PREV_HASH_LEN)
}
