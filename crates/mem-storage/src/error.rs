/// Stage at which a decode failure occurred. Shared by every backend so the
/// Memory Manager can apply one retry policy regardless of which backend
/// produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Qr,
    Video,
    Json,
}

impl std::fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecodeStage::Qr => "qr",
            DecodeStage::Video => "video",
            DecodeStage::Json => "json",
        };
        f.write_str(s)
    }
}

/// Error vocabulary shared by every [`crate::StorageBackend`] implementation,
/// matching the core's language-neutral error kinds one-to-one.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: scope is not ready for writes")]
    Conflict,

    #[error("busy: write queue is full, retry with backoff")]
    Busy,

    #[error("integrity error at {broken_at}: {detail}")]
    Integrity { broken_at: u64, detail: String },

    #[error("decode error at stage {stage} (retryable: {retryable})")]
    Decode { stage: DecodeStage, retryable: bool },

    #[error("encode error for batch {batch_id} after {attempts} attempts")]
    Encode { batch_id: String, attempts: u32 },

    #[error("io error during {op}: {cause}")]
    Io { op: String, cause: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("journal error: {0}")]
    Journal(#[from] mem_journal::JournalError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    pub fn io(op: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        StorageError::Io {
            op: op.into(),
            cause: cause.to_string(),
        }
    }

    /// One-line remediation hint per §7 ("every error includes ... one
    /// remediation hint").
    pub fn remediation_hint(&self, scope: &str) -> String {
        match self {
            StorageError::NotFound | StorageError::AlreadyExists(_) => {
                "no action needed; check the id and retry".to_string()
            }
            StorageError::Conflict => format!("wait for scope={scope} to become READY and retry"),
            StorageError::Busy => "retry with exponential backoff".to_string(),
            StorageError::Integrity { .. } => format!("run rebuild on scope={scope}"),
            StorageError::Decode { retryable: true, .. } => {
                "transient decode failure; retry the read".to_string()
            }
            StorageError::Decode { retryable: false, .. } => {
                format!("run verify on scope={scope}; data may be corrupted")
            }
            StorageError::Encode { .. } => {
                format!("inspect quarantined item and run rebuild on scope={scope}")
            }
            StorageError::Io { .. } => "check disk space and filesystem permissions".to_string(),
            StorageError::Config(_) => "fix the offending configuration value and reopen".to_string(),
            StorageError::Unsupported(_) => {
                "choose a supported backend or install the missing codec".to_string()
            }
            StorageError::Journal(_) => format!("run verify on scope={scope}"),
            StorageError::Serde(_) => "payload is malformed; run rebuild".to_string(),
        }
    }
}
