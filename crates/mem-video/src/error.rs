/// Error vocabulary for the video-coded backend. Converts into
/// [`mem_storage::StorageError`] at the `mem-storage` boundary so the
/// Memory Manager sees one error type regardless of backend.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("no codec implementation is available (native and in-process both failed to initialize)")]
    NoCodecAvailable,

    #[error("requested codec is unsupported: {0}")]
    Unsupported(String),

    #[error("native codec process exited with status {0}")]
    NativeProcessFailed(i32),

    #[error("native codec process could not be spawned: {0}")]
    NativeSpawn(String),

    #[error("frame index is invalid: {0}")]
    InvalidFrameIndex(String),

    #[error("qr codec error: {0}")]
    Qr(#[from] mem_qr::QrError),

    #[error("mp4 mux/demux error: {0}")]
    Mp4(String),

    #[error("decode failed at stage {stage} (retryable: {retryable})")]
    Decode { stage: mem_storage::DecodeStage, retryable: bool },

    #[error("content hash mismatch after reassembly")]
    HashMismatch,

    #[error("io error during {op}: {cause}")]
    Io { op: String, cause: String },

    #[error("journal error: {0}")]
    Journal(#[from] mem_journal::JournalError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl VideoError {
    pub fn io(op: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        VideoError::Io { op: op.into(), cause: cause.to_string() }
    }
}

impl From<VideoError> for mem_storage::StorageError {
    fn from(err: VideoError) -> Self {
        use mem_storage::{DecodeStage, StorageError};
        match err {
            VideoError::NoCodecAvailable => StorageError::Unsupported(
                "video backend: no codec implementation could initialize".to_string(),
            ),
            VideoError::Unsupported(detail) => StorageError::Unsupported(detail),
            VideoError::NativeProcessFailed(code) => StorageError::Encode {
                batch_id: format!("exit={code}"),
                attempts: 1,
            },
            VideoError::NativeSpawn(detail) => StorageError::Unsupported(detail),
            VideoError::InvalidFrameIndex(detail) => {
                StorageError::Integrity { broken_at: 0, detail }
            }
            VideoError::Qr(e) => StorageError::Decode { stage: DecodeStage::Qr, retryable: true }.tap_source(e),
            VideoError::Mp4(detail) => StorageError::Decode { stage: DecodeStage::Video, retryable: true }.tap_source(detail),
            VideoError::Decode { stage, retryable } => StorageError::Decode { stage, retryable },
            VideoError::HashMismatch => StorageError::Integrity {
                broken_at: 0,
                detail: "reassembled payload hash did not match content hash".to_string(),
            },
            VideoError::Io { op, cause } => StorageError::Io { op, cause },
            VideoError::Journal(e) => StorageError::Journal(e),
            VideoError::Serde(e) => StorageError::Serde(e),
        }
    }
}

/// Small extension so the conversions above can attach source context without
/// `StorageError` growing a generic payload variant just for this crate.
trait TapSource {
    fn tap_source(self, source: impl std::fmt::Display) -> Self;
}

impl TapSource for mem_storage::StorageError {
    fn tap_source(self, source: impl std::fmt::Display) -> Self {
        tracing::debug!(%source, "video error converted to storage error");
        self
    }
}
