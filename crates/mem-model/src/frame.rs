//! Frame index and video manifest record shapes (the `.mvi` sidecar and the
//! content-hash → frame-range manifest). See `mem-video` for the binary
//! encoding; this crate only owns the logical record.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    I,
    P,
    B,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameIndexEntry {
    pub frame_number: u32,
    pub byte_offset: u64,
    pub frame_size: u32,
    pub frame_type: FrameType,
    pub timestamp_ms: u32,
    pub is_keyframe: bool,
}

/// One entry of a segment's manifest: where the bytes for a given content
/// hash live within the consolidated video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoSegmentManifestEntry {
    pub content_hash: String,
    pub first_frame: u32,
    pub last_frame: u32,
    pub uncompressed_size: u64,
    pub chunk_count: u32,
}
