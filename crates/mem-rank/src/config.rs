/// Tuning knobs for hybrid score fusion (`spec.md` §4.11, §6). A plain
/// `Default`-implementing struct; this crate never reads configuration
/// files itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankConfig {
    /// Each candidate generator is asked for `candidate_multiplier * k` ids
    /// before fusion narrows back down to `k`.
    pub candidate_multiplier: usize,
    /// Base weight before the mean-idf/oov-rate adjustment.
    pub alpha_base: f32,
    /// Scales `tanh(mean_idf / idf_scale)` into the alpha adjustment.
    pub idf_scale: f32,
    /// Weight of the mean-idf term in the alpha adjustment.
    pub idf_weight: f32,
    /// Weight of the out-of-vocabulary-rate term in the alpha adjustment.
    pub oov_weight: f32,
    /// Lower clamp for the fused alpha (`spec.md` §6: `search.vector.weight_floor`).
    pub alpha_floor: f32,
    /// Upper clamp for the fused alpha (`spec.md` §6: `search.vector.weight_ceiling`).
    pub alpha_ceiling: f32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            candidate_multiplier: 6,
            alpha_base: 0.5,
            idf_scale: 6.0,
            idf_weight: 0.15,
            oov_weight: 0.25,
            alpha_floor: 0.2,
            alpha_ceiling: 0.8,
        }
    }
}

impl RankConfig {
    pub fn with_alpha_floor(mut self, floor: f32) -> Self {
        self.alpha_floor = floor;
        self
    }

    pub fn with_alpha_ceiling(mut self, ceiling: f32) -> Self {
        self.alpha_ceiling = ceiling;
        self
    }

    pub fn with_candidate_multiplier(mut self, mult: usize) -> Self {
        self.candidate_multiplier = mult;
        self
    }
}
