//! Top-level error composition (`spec.md` §7), mirroring how the teacher's
//! `server::ServerError` composes `IngestError`/`CanonicalError`/.../`MatchError`
//! via `#[from]` into one caller-facing type.

use crate::state::ScopeState;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(#[from] mem_storage::StorageError),

    #[error("vector index error: {0}")]
    Vector(#[from] mem_vector::VectorError),

    /// Write rejected because the scope is not `READY` (`spec.md` §7 `Conflict`).
    #[error("conflict: scope is not ready for writes (state={0:?})")]
    Conflict(ScopeState),

    /// Invalid option values, caught at scope-open time rather than at the
    /// first write that would have tripped over them (`spec.md` §7
    /// `ConfigError`). Also covers §8's "writing an item whose body is empty
    /// in all of title/text/code is rejected with `ConfigError`".
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("scope is already open")]
    AlreadyOpen,

    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("id not found: {0}")]
    NotFound(String),
}

impl MemoryError {
    /// One-line remediation hint per §7 ("every error includes ... one
    /// remediation hint").
    pub fn remediation_hint(&self, scope: &str) -> String {
        match self {
            MemoryError::Storage(e) => e.remediation_hint(scope),
            MemoryError::Vector(_) => format!("check embedding dimension for scope={scope} and retry"),
            MemoryError::Conflict(_) => format!("wait for scope={scope} to become READY and retry"),
            MemoryError::ConfigError(_) => "fix the offending configuration value or item body and retry".to_string(),
            MemoryError::AlreadyOpen => "no action needed; reuse the existing handle".to_string(),
            MemoryError::UnknownScope(_) => "open the scope before using it".to_string(),
            MemoryError::NotFound(_) => "no action needed; check the id and retry".to_string(),
        }
    }
}

/// Every operation's error carries its own name, the scope it targeted, and
/// the underlying cause — the three things §7 requires every error surface.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed for scope={scope}: {source} (hint: {hint})")]
pub struct OperationError {
    pub operation: &'static str,
    pub scope: String,
    #[source]
    pub source: MemoryError,
    pub hint: String,
}

impl OperationError {
    pub fn new(operation: &'static str, scope: impl Into<String>, source: impl Into<MemoryError>) -> Self {
        let scope = scope.into();
        let source = source.into();
        let hint = source.remediation_hint(&scope);
        Self { operation, scope, source, hint }
    }
}
