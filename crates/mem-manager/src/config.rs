//! Per-scope configuration (`spec.md` §6: "Configuration options recognized
//! by the core"). Every struct here is plain-`Default`; the core never reads
//! a config file itself, matching `canonical::CanonicalizeConfig` /
//! `ingest::IngestConfig` in the teacher corpus.

use mem_bm25::Bm25Config;
use mem_rank::RankConfig;
use mem_vector::AnnConfig;
use mem_video::{OnCodecMissing, PixelFormat, VideoCodecKind};

/// Which backend a scope is persisted through (`spec.md` §6 `storage.backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    File,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// `journal.fsync_batch`: fsync every N journal appends.
    pub journal_fsync_batch: usize,
    /// `journal.compact_threshold_entries`: trigger `compact()` once the
    /// journal accumulates this many entries since its last snapshot.
    pub journal_compact_threshold_entries: u64,
    /// `storage.cache.payload_mb`.
    pub payload_cache_mb: u64,
    /// Bounded write queue depth before `write_item` fails `Busy`
    /// (`spec.md` §5 "Back-pressure").
    pub write_queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::File,
            journal_fsync_batch: 1,
            journal_compact_threshold_entries: 10_000,
            payload_cache_mb: 64,
            write_queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub codec: VideoCodecKind,
    /// `video.crf` ∈ [18..28].
    pub crf: u8,
    /// `video.gop` ∈ [1..60].
    pub gop: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    pub preset: String,
    /// `storage.cache.frame_mb`.
    pub frame_cache_mb: u64,
    pub on_codec_missing: OnCodecMissing,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let opts = mem_video::default_options();
        Self {
            codec: opts.codec,
            crf: opts.crf,
            gop: opts.gop,
            fps: opts.fps,
            pixel_format: opts.pixel_format,
            preset: opts.preset,
            frame_cache_mb: 32,
            on_codec_missing: OnCodecMissing::default(),
        }
    }
}

impl VideoConfig {
    pub fn to_encode_options(&self) -> mem_video::EncodeOptions {
        mem_video::EncodeOptions {
            codec: self.codec,
            crf: self.crf,
            gop: self.gop,
            fps: self.fps,
            pixel_format: self.pixel_format,
            preset: self.preset.clone(),
            tune: mem_video::default_options().tune,
        }
    }
}

/// `qr.ecc`/`qr.version`: the exact type `VideoBackend::open` takes, so
/// there is no separate knob that goes unread — a scope's `qr` config *is*
/// the options its video backend encodes with.
pub type QrConfig = mem_qr::QrEncodeOptions;
pub use mem_qr::{QrEcc, QrVersionPref as QrVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfig {
    pub sensitivity_default: mem_model::Sensitivity,
    pub secret_redaction: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sensitivity_default: mem_model::Sensitivity::Team,
            secret_redaction: true,
        }
    }
}

/// The full set of policies one scope opens with.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    pub bm25: Bm25Config,
    pub vector: AnnConfig,
    pub rank: RankConfig,
    pub storage: StorageConfig,
    pub video: VideoConfig,
    pub qr: QrConfig,
    pub security: SecurityConfig,
}

impl ScopeConfig {
    /// Range checks for the values `spec.md` §6 documents as constrained
    /// (`video.crf ∈ [18..28]`, `video.gop ∈ [1..60]`), run once at scope-open
    /// time so a bad value surfaces as `ConfigError` instead of failing
    /// obscurely on the first write.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.backend == StorageBackendKind::Video {
            if !(18..=28).contains(&self.video.crf) {
                return Err(format!("video.crf={} out of range [18..28]", self.video.crf));
            }
            if !(1..=60).contains(&self.video.gop) {
                return Err(format!("video.gop={} out of range [1..60]", self.video.gop));
            }
        }
        Ok(())
    }
}
