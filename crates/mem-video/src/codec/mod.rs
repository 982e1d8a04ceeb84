//! The abstract video codec adapter (`spec.md` §4.7): encode a stream of
//! [`mem_qr::QrFrame`]s to an MP4 byte stream and decode it back, behind a
//! trait so the storage backend never depends on which implementation is
//! wired in.

mod in_process;
mod native;
mod select;

pub use in_process::InProcessCodec;
pub use native::NativeCodec;
pub use select::{select_codec, OnCodecMissing};

use mem_model::FrameIndexEntry;
use mem_qr::QrFrame;

use crate::error::VideoError;
use crate::frame_index::FrameIndexReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecKind {
    H264,
    H265,
}

impl VideoCodecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodecKind::H264 => "h264",
            VideoCodecKind::H265 => "h265",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420p,
}

/// Encoder tuning knobs. `default_options()` matches `spec.md` §4.7 exactly.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub codec: VideoCodecKind,
    pub crf: u8,
    pub gop: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    pub preset: String,
    pub tune: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        default_options()
    }
}

pub fn default_options() -> EncodeOptions {
    EncodeOptions {
        codec: VideoCodecKind::H264,
        crf: 23,
        gop: 30,
        fps: 30,
        pixel_format: PixelFormat::Yuv420p,
        preset: "medium".to_string(),
        tune: "stillimage".to_string(),
    }
}

/// Result of a successful encode: the MP4 bytes, the frame index entries
/// describing it, and free-form codec metadata (e.g. which implementation
/// produced it, wall-clock duration).
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub bytes: Vec<u8>,
    pub frame_index: Vec<FrameIndexEntry>,
    pub metadata: serde_json::Value,
}

/// The abstract encoder/decoder contract. Implementations must accept
/// inaccurate seeking by falling back to keyframe-then-scan decoding via the
/// supplied [`FrameIndexReader`] (`spec.md` §4.7).
pub trait VideoCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap availability probe, re-checked at selection time; must not
    /// panic or block for long.
    fn is_available(&self) -> bool;

    fn initialize(&self) -> Result<(), VideoError>;

    fn dispose(&self) -> Result<(), VideoError>;

    fn encode(&self, frames: &[QrFrame], options: &EncodeOptions) -> Result<EncodedVideo, VideoError>;

    /// Extract one frame as RGBA. `frame_width`/`frame_height` are carried
    /// separately from the `.mvi` format (which has no geometry field, per
    /// `spec.md` §4.6) since every frame in a segment shares one geometry;
    /// the video storage backend threads it through from its manifest.
    fn decode_frame(
        &self,
        mp4_bytes: &[u8],
        frame_index: &FrameIndexReader,
        frame_number: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<QrFrame, VideoError>;
}
