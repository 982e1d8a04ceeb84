//! BM25 tuning knobs (`spec.md` §4.9, §6). A plain `Default`-implementing
//! struct the caller builds and passes in — this crate never reads
//! configuration files itself.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Config {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization.
    pub b: f32,
    /// Multiplier applied to the title field's contribution to term
    /// frequency before BM25 saturation.
    pub boost_title: f32,
    /// Multiplier applied to the whole document score when `quality.pinned`.
    pub boost_pinned: f32,
    /// Multiplier applied when the query, trimmed and lowercased, equals
    /// the document title exactly.
    pub boost_exact_match: f32,
    /// Ceiling of the recency multiplier; decays from this value toward
    /// 1.0 as `updated_at` ages past `recency_half_life_days`.
    pub boost_recent: f32,
    pub recency_half_life_days: f32,
    /// Multiplier applied when a query token exactly matches one of the
    /// document's tags.
    pub boost_tag_exact: f32,
    /// Candidates scoring below this floor are pruned before ranking.
    pub min_score: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            boost_title: 2.0,
            boost_pinned: 2.0,
            boost_exact_match: 3.0,
            boost_recent: 1.3,
            recency_half_life_days: 30.0,
            boost_tag_exact: 1.2,
            min_score: 0.0,
        }
    }
}
