//! The Memory Manager: opens scopes against a pluggable storage backend,
//! keeps BM25 and vector indexes current as items are written, and answers
//! hybrid queries (`spec.md` §4.11, §4.12).

mod config;
mod error;
mod manager;
mod query;
mod redact;
mod state;

pub use config::{
    QrConfig, QrEcc, QrVersion, ScopeConfig, SecurityConfig, StorageBackendKind, StorageConfig, VideoConfig,
};
pub use error::{MemoryError, OperationError};
pub use manager::MemoryManager;
pub use query::{build_context_pack, Query, QueryFacets, QueryFilters, QueryResult, ReturnMode};
pub use state::ScopeState;
