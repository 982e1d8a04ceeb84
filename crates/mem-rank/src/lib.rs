//! Hybrid BM25+vector score fusion (`spec.md` §4.11): independent min-max
//! normalization of each candidate list, an adaptive α weighting BM25
//! against the vector channel by query specificity, and a final fused,
//! sorted, truncated candidate list. Post-filters, late materialization, and
//! the `context_pack` trimming mode live in `mem-manager`, which owns the
//! catalog and backend this crate has no dependency on.

mod config;
mod fuse;

pub use config::RankConfig;
pub use fuse::{compute_alpha, fuse_candidates, normalize_min_max, FusedCandidate, ScoredCandidate};
