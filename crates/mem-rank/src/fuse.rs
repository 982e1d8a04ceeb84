//! Candidate-map-by-key fusion of BM25 and vector score lists, adapted from
//! `matcher::engine::postprocess_hits`/`calculate_final_score`'s
//! union-by-key + weighted-combine shape to the spec's adaptive α in place
//! of a fixed `MatchExpr::Weighted` weight.

use std::collections::HashMap;

use crate::config::RankConfig;

/// One side's score list entering fusion; ids absent from a list are treated
/// as a `0.0` contribution from that side after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub id: String,
    pub score: f32,
}

/// A fused hit: its component scores survive so callers (facets, debugging)
/// can see how the final score was composed.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    pub bm25_norm: f32,
    pub vec_norm: f32,
    pub alpha: f32,
}

/// Min-max normalize a score list to `[0, 1]`. A list with zero spread (all
/// scores equal, including the empty and singleton cases) normalizes every
/// entry to `1.0` rather than dividing by zero.
pub fn normalize_min_max(candidates: &[ScoredCandidate]) -> HashMap<String, f32> {
    if candidates.is_empty() {
        return HashMap::new();
    }
    let min = candidates.iter().map(|c| c.score).fold(f32::INFINITY, f32::min);
    let max = candidates.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;

    candidates
        .iter()
        .map(|c| {
            let norm = if spread <= f32::EPSILON { 1.0 } else { (c.score - min) / spread };
            (c.id.clone(), norm)
        })
        .collect()
}

/// `α = clamp(alpha_base + idf_weight·tanh(mean_idf/idf_scale) - oov_weight·oov_rate, alpha_floor, alpha_ceiling)`
/// (`spec.md` §4.11). `mean_idf` is the query tokens' mean BM25 IDF; `oov_rate`
/// is the fraction of query tokens absent from the BM25 vocabulary. Both are
/// computed by the caller against the BM25 index so this crate stays free of
/// a dependency on it.
pub fn compute_alpha(mean_idf: f32, oov_rate: f32, config: &RankConfig) -> f32 {
    let adjustment = config.idf_weight * (mean_idf / config.idf_scale).tanh() - config.oov_weight * oov_rate;
    (config.alpha_base + adjustment).clamp(config.alpha_floor, config.alpha_ceiling)
}

/// Union BM25 and vector candidates by id, normalize each side independently,
/// fuse with the given α, and return results sorted by descending score
/// (ties broken by ascending id for determinism), truncated to `k`.
pub fn fuse_candidates(
    bm25: &[ScoredCandidate],
    vector: &[ScoredCandidate],
    alpha: f32,
    k: usize,
) -> Vec<FusedCandidate> {
    let bm25_norm = normalize_min_max(bm25);
    let vec_norm = normalize_min_max(vector);

    let mut ids: Vec<&String> = bm25_norm.keys().chain(vec_norm.keys()).collect();
    ids.sort();
    ids.dedup();

    let mut fused: Vec<FusedCandidate> = ids
        .into_iter()
        .map(|id| {
            let b = bm25_norm.get(id).copied().unwrap_or(0.0);
            let v = vec_norm.get(id).copied().unwrap_or(0.0);
            FusedCandidate {
                id: id.clone(),
                score: alpha * b + (1.0 - alpha) * v,
                bm25_norm: b,
                vec_norm: v,
                alpha,
            }
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
    fused.truncate(k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_empty_and_uniform_lists() {
        assert!(normalize_min_max(&[]).is_empty());

        let uniform = vec![ScoredCandidate { id: "a".into(), score: 5.0 }, ScoredCandidate { id: "b".into(), score: 5.0 }];
        let norm = normalize_min_max(&uniform);
        assert_eq!(norm["a"], 1.0);
        assert_eq!(norm["b"], 1.0);
    }

    #[test]
    fn normalize_spreads_min_to_zero_max_to_one() {
        let candidates = vec![
            ScoredCandidate { id: "a".into(), score: 1.0 },
            ScoredCandidate { id: "b".into(), score: 3.0 },
            ScoredCandidate { id: "c".into(), score: 5.0 },
        ];
        let norm = normalize_min_max(&candidates);
        assert_eq!(norm["a"], 0.0);
        assert_eq!(norm["b"], 0.5);
        assert_eq!(norm["c"], 1.0);
    }

    #[test]
    fn alpha_stays_within_configured_clamp() {
        let config = RankConfig::default();
        assert!(compute_alpha(0.0, 1.0, &config) >= config.alpha_floor);
        assert!(compute_alpha(100.0, 0.0, &config) <= config.alpha_ceiling);
    }

    #[test]
    fn alpha_rises_with_idf_and_falls_with_oov() {
        let config = RankConfig::default();
        let high_idf = compute_alpha(8.0, 0.0, &config);
        let baseline = compute_alpha(0.0, 0.0, &config);
        let high_oov = compute_alpha(0.0, 0.8, &config);
        assert!(high_idf > baseline);
        assert!(high_oov < baseline);
    }

    #[test]
    fn fuse_unions_by_id_and_treats_missing_side_as_zero() {
        let bm25 = vec![ScoredCandidate { id: "a".into(), score: 1.0 }, ScoredCandidate { id: "b".into(), score: 2.0 }];
        let vector = vec![ScoredCandidate { id: "b".into(), score: 1.0 }, ScoredCandidate { id: "c".into(), score: 2.0 }];

        let fused = fuse_candidates(&bm25, &vector, 0.5, 10);
        let ids: Vec<&str> = fused.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(ids.contains(&"c"));

        // "b" appears on both sides and should outrank ids on only one side.
        assert_eq!(fused[0].id, "b");
    }

    #[test]
    fn fuse_truncates_to_k() {
        let bm25: Vec<ScoredCandidate> = (0..20).map(|i| ScoredCandidate { id: format!("id{i}"), score: i as f32 }).collect();
        let fused = fuse_candidates(&bm25, &[], 1.0, 5);
        assert_eq!(fused.len(), 5);
    }
}
