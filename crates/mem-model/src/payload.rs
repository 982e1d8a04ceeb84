//! [`PayloadRef`]: a weak handle to where an item's bytes physically live.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    File,
    Video,
}

/// A handle to stored bytes, valid until a matching delete is confirmed.
/// `segment_id`/`frame_start`/`frame_end` are only populated for the video
/// backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadRef {
    pub content_hash: String,
    pub backend: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_end: Option<u32>,
}
