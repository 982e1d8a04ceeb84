//! Approximate nearest-neighbor vector index (`spec.md` §4.10): HNSW over
//! unit-normalized embeddings with tombstone-marked removal, falling back to
//! exact linear scan below the configured corpus-size threshold.

mod config;
mod error;
mod index;

pub use config::AnnConfig;
pub use error::VectorError;
pub use index::{VectorHit, VectorIndex};
