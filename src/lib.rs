//! Workspace umbrella crate for the local memory core.
//!
//! `memory-core` re-exports the storage, indexing, and orchestration layers
//! so applications can depend on one crate instead of wiring up
//! `mem-storage`, `mem-bm25`, `mem-vector`, `mem-rank`, and `mem-manager`
//! individually. [`MemoryManager`] is the entry point: open one or more
//! scopes against it, then call `upsert`/`get`/`delete`/`query` and the
//! maintenance operations (`rebuild`/`verify`/`snapshot`/`compact`).
//!
//! ```ignore
//! use chrono::Utc;
//! use memory_core::{
//!     Facets, MemoryItem, MemoryItemType, MemoryManager, Query, Quality, Scope, ScopeConfig,
//!     Security,
//! };
//!
//! # fn demo() -> Result<(), memory_core::OperationError> {
//! let manager = MemoryManager::new("/tmp/agent-memory", "agent-session-1");
//! manager.open_scope(Scope::Local, ScopeConfig::default())?;
//!
//! let now = Utc::now();
//! let item = MemoryItem {
//!     id: String::new(),
//!     item_type: MemoryItemType::Pattern,
//!     scope: Scope::Local,
//!     title: "useApi hook pattern".to_string(),
//!     text: None,
//!     code: None,
//!     language: None,
//!     facets: Facets::default(),
//!     context: Default::default(),
//!     quality: Quality { confidence: 0.5, reuse_count: 0, pinned: false },
//!     security: Security::default(),
//!     links: Vec::new(),
//!     created_at: now,
//!     updated_at: now,
//!     version: 0,
//! };
//! let id = manager.upsert(item, None)?;
//!
//! let result = manager.query(Query::new("useApi", 5))?;
//! assert!(result.items.iter().any(|item| item.id == id));
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage backends
//!
//! Every scope persists through one [`StorageBackend`] implementation,
//! chosen per scope by [`StorageBackendKind`]: the filesystem-native
//! [`FileBackend`] or the video-coded [`mem_video::VideoBackend`], which
//! packs item payloads into QR-coded video frames for archival-friendly,
//! dedicated storage. Both sit behind the same trait, so the manager and the
//! indexes never know which one backs a given scope.
//!
//! ## Search
//!
//! Queries fuse two independent candidate generators — the lexical
//! [`mem_bm25::InvertedIndex`] and the approximate-nearest-neighbor
//! [`mem_vector::VectorIndex`] — through [`mem_rank`]'s adaptive-alpha score
//! fusion, so keyword-heavy and embedding-heavy queries both land in the
//! same ranked list without a caller having to choose a mode up front.
//!
//! ## Errors and logging
//!
//! Every fallible entry point returns an [`OperationError`], which names the
//! operation, the scope it targeted, the underlying [`MemoryError`], and one
//! remediation hint. The crate emits [`tracing`] events rather than writing
//! to stdout directly; install a subscriber to observe scope lifecycle
//! transitions, write back-pressure, and maintenance runs.

pub use mem_bm25::{Bm25Config, InvertedIndex, ScoredId};
pub use mem_hash::{content_hash, generate_id, IdGenerator};
pub use mem_journal::{Journal, VerifyReport};
pub use mem_manager::{
    MemoryError, MemoryManager, OperationError, Query, QueryFacets, QueryFilters, QueryResult,
    ReturnMode, ScopeConfig, ScopeState, SecurityConfig, StorageBackendKind, StorageConfig,
    VideoConfig,
};
pub use mem_model::{
    Facets, JournalEntry, JournalOp, Link, MemoryItem, MemoryItemSummary, MemoryItemType, Quality,
    Rel, Scope, Security, Sensitivity, ValidationError,
};
pub use mem_qr::{decode as qr_decode, encode as qr_encode, QrError, QrFrame};
pub use mem_rank::{compute_alpha, fuse_candidates, FusedCandidate, RankConfig};
pub use mem_storage::{FileBackend, StorageBackend, StorageError};
pub use mem_vector::{AnnConfig, VectorError, VectorHit, VectorIndex};
pub use mem_video::{EncodeOptions, OnCodecMissing, VideoBackend, VideoError};
