#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal is full: {0}")]
    JournalFull(String),

    #[error("journal is locked for writes (integrity check failed at offset {broken_at})")]
    JournalLocked { broken_at: u64 },

    #[error("journal record corrupt at offset {offset}: {detail}")]
    Corrupt { offset: u64, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
