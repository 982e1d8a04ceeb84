/// Tuning knobs for the HNSW-backed vector index (`spec.md` §4.10, §6).
#[derive(Debug, Clone, Copy)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    pub m: usize,
    /// Dynamic candidate list size during construction.
    pub ef_construction: usize,
    /// Dynamic candidate list size during search.
    pub ef_search: usize,
    /// Upper bound on results returned from one search.
    pub max_results: usize,
    /// Whether to use the HNSW graph at all; `false` forces linear scan.
    pub enabled: bool,
    /// Below this many live vectors, linear scan is used even if enabled.
    pub min_vectors_for_ann: usize,
    /// Hits below this cosine similarity are dropped (`spec.md` §4.10).
    pub cosine_floor: f32,
    /// `compact()` only rebuilds once the tombstone/total ratio exceeds
    /// this fraction (`spec.md` §4.10: "exceeds 20%").
    pub tombstone_compact_ratio: f32,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_results: 100,
            enabled: true,
            min_vectors_for_ann: 1000,
            cosine_floor: 0.1,
            tombstone_compact_ratio: 0.2,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    pub fn with_cosine_floor(mut self, floor: f32) -> Self {
        self.cosine_floor = floor;
        self
    }

    pub fn with_tombstone_compact_ratio(mut self, ratio: f32) -> Self {
        self.tombstone_compact_ratio = ratio;
        self
    }

    pub fn should_use_ann(&self, live_vectors: usize) -> bool {
        self.enabled && live_vectors >= self.min_vectors_for_ann
    }
}
