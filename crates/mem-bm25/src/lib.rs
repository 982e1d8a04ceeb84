//! The BM25 inverted index (`spec.md` §4.9): a tokenizer aware of
//! camelCase/snake_case identifiers, incremental upsert/remove, and scoring
//! with title/pinned/exact-match/recency/tag boosts layered on top of
//! standard BM25.

mod config;
mod index;
mod tokenizer;

pub use config::Bm25Config;
pub use index::{InvertedIndex, ScoredId};
pub use tokenizer::tokenize;
