//! ANN vector index over unit-L2-normalized fixed-dimension vectors
//! (`spec.md` §4.10): HNSW when the corpus is large enough to benefit, exact
//! linear scan otherwise, with tombstone-marked removal and periodic
//! compaction once the tombstone ratio crosses a threshold.

use std::collections::{HashMap, HashSet};

use hnsw_rs::prelude::*;

use crate::config::AnnConfig;
use crate::error::VectorError;

/// One hit from [`VectorIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub cosine: f32,
}

fn l2_normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(-1.0, 1.0)
}

pub struct VectorIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    id_to_index: HashMap<String, usize>,
    index_to_id: HashMap<usize, String>,
    vectors: Vec<Vec<f32>>,
    tombstones: HashSet<usize>,
    built: bool,
}

impl VectorIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            id_to_index: HashMap::new(),
            index_to_id: HashMap::new(),
            vectors: Vec::new(),
            tombstones: HashSet::new(),
            built: false,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &AnnConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: AnnConfig) {
        let needs_rebuild = config.m != self.config.m || config.ef_construction != self.config.ef_construction;
        self.config = config;
        if needs_rebuild {
            self.built = false;
        }
    }

    /// Number of live (non-tombstoned) vectors.
    pub fn len(&self) -> usize {
        self.vectors.len() - self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dim(&self, got: usize) -> Result<(), VectorError> {
        if got != self.dimension {
            return Err(VectorError::DimensionMismatch { expected: self.dimension, got });
        }
        Ok(())
    }

    /// Insert or replace a vector for `id`. Replacing tombstones the
    /// previous slot rather than mutating it in place, since the HNSW graph
    /// this index may be backed by does not support in-place updates.
    pub fn add(&mut self, id: String, vector: Vec<f32>) -> Result<(), VectorError> {
        self.check_dim(vector.len())?;
        let normalized = l2_normalize(&vector).ok_or_else(|| VectorError::ZeroVector { id: id.clone() })?;

        if let Some(&old_index) = self.id_to_index.get(&id) {
            self.tombstones.insert(old_index);
            self.index_to_id.remove(&old_index);
        }

        let index = self.vectors.len();
        self.vectors.push(normalized);
        self.id_to_index.insert(id.clone(), index);
        self.index_to_id.insert(index, id);
        self.built = false;
        Ok(())
    }

    /// Validate every vector's dimension before inserting any of them;
    /// rejects the entire batch on a single mismatch (`spec.md` §4.10).
    pub fn bulk_add(&mut self, items: Vec<(String, Vec<f32>)>) -> Result<(), VectorError> {
        for (id, vec) in &items {
            if vec.len() != self.dimension {
                return Err(VectorError::BulkDimensionMismatch {
                    failed_id: id.clone(),
                    expected: self.dimension,
                    got: vec.len(),
                });
            }
        }
        for (id, vec) in items {
            self.add(id, vec)?;
        }
        Ok(())
    }

    /// Returns `false` if `id` was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.id_to_index.remove(id) else {
            return false;
        };
        self.index_to_id.remove(&index);
        self.tombstones.insert(index);
        self.built = false;
        true
    }

    fn tombstone_ratio(&self) -> f32 {
        if self.vectors.is_empty() {
            0.0
        } else {
            self.tombstones.len() as f32 / self.vectors.len() as f32
        }
    }

    /// Rebuild the graph once the tombstone ratio exceeds the configured
    /// threshold; a no-op otherwise, so callers can invoke this on a
    /// periodic schedule without checking first (`spec.md` §4.10).
    pub fn compact(&mut self) {
        if self.tombstones.is_empty() || self.tombstone_ratio() <= self.config.tombstone_compact_ratio {
            return;
        }

        let mut live: Vec<(String, Vec<f32>)> = Vec::with_capacity(self.len());
        let mut order: Vec<usize> = (0..self.vectors.len()).filter(|i| !self.tombstones.contains(i)).collect();
        order.sort_unstable();
        for old_index in order {
            if let Some(id) = self.index_to_id.get(&old_index) {
                live.push((id.clone(), self.vectors[old_index].clone()));
            }
        }

        self.vectors.clear();
        self.id_to_index.clear();
        self.index_to_id.clear();
        self.tombstones.clear();
        self.built = false;

        for (id, vec) in live {
            let index = self.vectors.len();
            self.vectors.push(vec);
            self.id_to_index.insert(id.clone(), index);
            self.index_to_id.insert(index, id);
        }

        tracing::info!(live = self.vectors.len(), "vector index compacted");
    }

    /// Build (or rebuild) the HNSW graph over all live vectors. Below 10
    /// live vectors HNSW construction is skipped entirely and search falls
    /// back to linear scan, matching the teacher index's small-corpus
    /// handling.
    pub fn build(&mut self) {
        let live_indices: Vec<usize> = (0..self.vectors.len()).filter(|i| !self.tombstones.contains(i)).collect();
        if live_indices.is_empty() {
            self.built = true;
            self.hnsw = None;
            return;
        }
        if live_indices.len() < 10 {
            self.built = true;
            self.hnsw = None;
            return;
        }

        let nb_elem = live_indices.len();
        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistCosine>::new(self.config.m, nb_elem, nb_layer, self.config.ef_construction, DistCosine {});

        let data_for_insertion: Vec<(&Vec<f32>, usize)> = live_indices.iter().map(|&i| (&self.vectors[i], i)).collect();
        hnsw.parallel_insert(&data_for_insertion);

        self.hnsw = Some(hnsw);
        self.built = true;
    }

    pub fn rebuild(&mut self) {
        self.built = false;
        self.build();
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, VectorError> {
        self.check_dim(query.len())?;
        let normalized = l2_normalize(query).unwrap_or_else(|| vec![0.0; self.dimension]);
        let k = k.min(self.config.max_results);

        let hits = if self.built && self.hnsw.is_some() && self.config.should_use_ann(self.len()) {
            self.hnsw_search(&normalized, k)
        } else {
            self.linear_search(&normalized, k)
        };
        Ok(hits)
    }

    fn hnsw_search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        let Some(hnsw) = &self.hnsw else { return Vec::new() };
        // Oversample to absorb tombstoned neighbors the graph hasn't shed yet.
        let oversampled_k = (k + self.tombstones.len().min(32)).max(k);
        let neighbours: Vec<Neighbour> = hnsw.search(query, oversampled_k, self.config.ef_search);

        let mut hits: Vec<VectorHit> = neighbours
            .into_iter()
            .filter(|n| !self.tombstones.contains(&n.get_origin_id()))
            .filter_map(|n| {
                let id = self.index_to_id.get(&n.get_origin_id())?.clone();
                let cosine = 1.0 - n.distance;
                Some(VectorHit { id, cosine })
            })
            .filter(|h| h.cosine >= self.config.cosine_floor)
            .collect();

        hits.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    fn linear_search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        let mut scored: Vec<VectorHit> = (0..self.vectors.len())
            .filter(|i| !self.tombstones.contains(i))
            .map(|i| VectorHit {
                id: self.index_to_id[&i].clone(),
                cosine: cosine_similarity(query, &self.vectors[i]),
            })
            .filter(|h| h.cosine >= self.config.cosine_floor)
            .collect();
        scored.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_dimension_on_add() {
        let mut idx = VectorIndex::new(3, AnnConfig::default());
        assert!(matches!(idx.add("a".into(), vec![1.0, 0.0]), Err(VectorError::DimensionMismatch { .. })));
    }

    #[test]
    fn rejects_zero_vector() {
        let mut idx = VectorIndex::new(3, AnnConfig::default());
        assert!(matches!(idx.add("a".into(), vec![0.0, 0.0, 0.0]), Err(VectorError::ZeroVector { .. })));
    }

    #[test]
    fn linear_search_finds_exact_match_first() {
        let mut idx = VectorIndex::new(3, AnnConfig::default());
        idx.add("doc1".into(), vec![1.0, 0.0, 0.0]).unwrap();
        idx.add("doc2".into(), vec![0.0, 1.0, 0.0]).unwrap();
        idx.add("doc3".into(), vec![0.0, 0.0, 1.0]).unwrap();

        let hits = idx.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, "doc1");
        assert!((hits[0].cosine - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_floor_drops_unrelated_hits() {
        let mut idx = VectorIndex::new(2, AnnConfig::default().with_cosine_floor(0.9));
        idx.add("close".into(), vec![1.0, 0.01]).unwrap();
        idx.add("orthogonal".into(), vec![0.0, 1.0]).unwrap();

        let hits = idx.search(&[1.0, 0.0], 5).unwrap();
        assert!(hits.iter().all(|h| h.id != "orthogonal"));
    }

    #[test]
    fn bulk_add_rejects_whole_batch_on_mismatch() {
        let mut idx = VectorIndex::new(3, AnnConfig::default());
        let batch = vec![("a".to_string(), vec![1.0, 0.0, 0.0]), ("b".to_string(), vec![1.0, 0.0])];
        assert!(matches!(idx.bulk_add(batch), Err(VectorError::BulkDimensionMismatch { .. })));
        assert!(idx.is_empty());
    }

    #[test]
    fn remove_then_search_excludes_tombstoned_entry() {
        let mut idx = VectorIndex::new(3, AnnConfig::default());
        idx.add("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        idx.add("b".into(), vec![0.0, 1.0, 0.0]).unwrap();
        assert!(idx.remove("a"));
        assert!(!idx.remove("a"));

        let hits = idx.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert!(hits.iter().all(|h| h.id != "a"));
    }

    #[test]
    fn compact_is_a_no_op_below_threshold_and_shrinks_above_it() {
        let mut idx = VectorIndex::new(3, AnnConfig::default().with_tombstone_compact_ratio(0.2));
        for i in 0..10 {
            idx.add(format!("id{i}"), vec![i as f32 + 1.0, 0.0, 0.0]).unwrap();
        }
        idx.remove("id0");
        idx.compact();
        assert_eq!(idx.vectors.len(), 10, "below 20% tombstone ratio, compact should no-op");

        for i in 1..4 {
            idx.remove(&format!("id{i}"));
        }
        idx.compact();
        assert_eq!(idx.vectors.len(), idx.len(), "above threshold, compact should shrink storage to live set");
        assert!(idx.tombstones.is_empty());
    }

    #[test]
    fn build_and_rebuild_toggle_built_flag() {
        let mut idx = VectorIndex::new(3, AnnConfig::default().with_min_vectors_for_ann(1));
        for i in 0..15 {
            idx.add(format!("id{i}"), vec![i as f32 + 1.0, 0.0, 0.0]).unwrap();
        }
        idx.build();
        assert!(idx.built);
        idx.add("id15".into(), vec![16.0, 0.0, 0.0]).unwrap();
        assert!(!idx.built);
        idx.rebuild();
        assert!(idx.built);
    }
}
