//! Engine tuning parameters.
//!
//! Every heuristic constant the engine uses lives here, in one immutable
//! [`EngineConfig`] that is handed to each component at construction. The
//! application deserializes it from the `[engine.*]` tables of its TOML
//! config; every field has a default so an empty table is valid.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub structure: StructureConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gap_fill: GapFillConfig,
}

/// Edge discovery thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Minimum similarity for an edge between chunks of the same category.
    #[serde(default = "default_same_domain_threshold")]
    pub same_domain_threshold: f32,
    /// Minimum similarity for an edge between chunks of different categories.
    #[serde(default = "default_cross_domain_threshold")]
    pub cross_domain_threshold: f32,
    /// A contrast marker only yields `contradicts` at or above this similarity.
    #[serde(default = "default_contradiction_min_similarity")]
    pub contradiction_min_similarity: f32,
    /// Expected embedding dimensionality.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Worker threads for pairwise discovery; `0` uses all available cores.
    #[serde(default)]
    pub parallelism: usize,
}

fn default_same_domain_threshold() -> f32 {
    0.45
}
fn default_cross_domain_threshold() -> f32 {
    0.40
}
fn default_contradiction_min_similarity() -> f32 {
    0.55
}
fn default_dimensions() -> usize {
    384
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            same_domain_threshold: default_same_domain_threshold(),
            cross_domain_threshold: default_cross_domain_threshold(),
            contradiction_min_similarity: default_contradiction_min_similarity(),
            dimensions: default_dimensions(),
            parallelism: 0,
        }
    }
}

/// Community, hub and bridge derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Modularity resolution; lower values favour fewer, larger communities.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// Seed for the node visiting order during community detection.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Upper bound on local-moving + aggregation passes.
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    /// Nodes at or above this degree-centrality percentile are hubs.
    #[serde(default = "default_hub_percentile")]
    pub hub_percentile: f64,
    #[serde(default = "default_bridge_min_categories")]
    pub bridge_min_categories: usize,
}

fn default_resolution() -> f64 {
    0.20
}
fn default_seed() -> u64 {
    42
}
fn default_max_passes() -> usize {
    16
}
fn default_hub_percentile() -> f64 {
    0.90
}
fn default_bridge_min_categories() -> usize {
    3
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            seed: default_seed(),
            max_passes: default_max_passes(),
            hub_percentile: default_hub_percentile(),
            bridge_min_categories: default_bridge_min_categories(),
        }
    }
}

/// Hybrid retrieval: fusion constants, BM25 parameters and boosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RRF smoothing constant `k` in `weight / (k + rank)`.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    /// Pre-filter half-width around an exact year filter.
    #[serde(default = "default_year_window")]
    pub year_window: u32,
    #[serde(default = "default_year_boost")]
    pub year_boost: f64,
    #[serde(default = "default_category_boost")]
    pub category_boost: f64,
    /// Chunks must exceed this cosine similarity to enter the dense ranking.
    #[serde(default)]
    pub min_dense_similarity: f64,
    /// Weight of the `exp(-λ·Δyears)` recency term; `0` disables it.
    #[serde(default)]
    pub recency_weight: f64,
    #[serde(default = "default_recency_lambda")]
    pub recency_lambda: f64,
    /// Weight of the per-chunk trust blend; `0` disables it.
    #[serde(default)]
    pub trust_weight: f64,
    /// Pull graph neighbours of the top fused candidates into the result.
    #[serde(default)]
    pub graph_expansion: bool,
    #[serde(default = "default_expansion_seeds")]
    pub expansion_seeds: usize,
    /// Neighbours each seed may pull in; hubs win ties.
    #[serde(default = "default_expansion_fanout")]
    pub expansion_fanout: usize,
    #[serde(default = "default_expansion_decay")]
    pub expansion_decay: f64,
    /// Pool size from which dense and lexical scoring run on separate threads.
    #[serde(default = "default_parallel_min_candidates")]
    pub parallel_min_candidates: usize,
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_dense_weight() -> f64 {
    1.0
}
fn default_sparse_weight() -> f64 {
    0.5
}
fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}
fn default_year_window() -> u32 {
    2
}
fn default_year_boost() -> f64 {
    0.5
}
fn default_category_boost() -> f64 {
    0.2
}
fn default_recency_lambda() -> f64 {
    0.1
}
fn default_expansion_seeds() -> usize {
    3
}
fn default_expansion_fanout() -> usize {
    3
}
fn default_expansion_decay() -> f64 {
    0.5
}
fn default_parallel_min_candidates() -> usize {
    2048
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            year_window: default_year_window(),
            year_boost: default_year_boost(),
            category_boost: default_category_boost(),
            min_dense_similarity: 0.0,
            recency_weight: 0.0,
            recency_lambda: default_recency_lambda(),
            trust_weight: 0.0,
            graph_expansion: false,
            expansion_seeds: default_expansion_seeds(),
            expansion_fanout: default_expansion_fanout(),
            expansion_decay: default_expansion_decay(),
            parallel_min_candidates: default_parallel_min_candidates(),
        }
    }
}

/// Gap-filling round budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFillConfig {
    /// Maximum retrieval calls per query, including the initial one.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Years added on each side when a sparse result widens its window.
    #[serde(default = "default_widen_step")]
    pub widen_step: u32,
}

fn default_max_rounds() -> usize {
    3
}
fn default_widen_step() -> u32 {
    2
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            widen_step: default_widen_step(),
        }
    }
}

impl EngineConfig {
    /// Reject values that would make the engine's behaviour undefined.
    pub fn validate(&self) -> Result<()> {
        let g = &self.graph;
        for (name, value) in [
            ("graph.same_domain_threshold", g.same_domain_threshold),
            ("graph.cross_domain_threshold", g.cross_domain_threshold),
            ("graph.contradiction_min_similarity", g.contradiction_min_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(config_error(format!("{} must be in [0.0, 1.0]", name)));
            }
        }
        if g.dimensions == 0 {
            return Err(config_error("graph.dimensions must be > 0"));
        }

        let s = &self.structure;
        if !(s.resolution > 0.0) {
            return Err(config_error("structure.resolution must be > 0"));
        }
        if !(0.0..1.0).contains(&s.hub_percentile) {
            return Err(config_error("structure.hub_percentile must be in [0.0, 1.0)"));
        }
        if s.bridge_min_categories == 0 {
            return Err(config_error("structure.bridge_min_categories must be >= 1"));
        }

        let r = &self.retrieval;
        if !(r.rrf_k > 0.0) {
            return Err(config_error("retrieval.rrf_k must be > 0"));
        }
        if r.dense_weight < 0.0 || r.sparse_weight < 0.0 {
            return Err(config_error("retrieval fusion weights must be >= 0"));
        }
        if r.bm25_k1 < 0.0 || !(0.0..=1.0).contains(&r.bm25_b) {
            return Err(config_error("retrieval.bm25_k1 must be >= 0 and bm25_b in [0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&r.expansion_decay) {
            return Err(config_error("retrieval.expansion_decay must be in [0.0, 1.0]"));
        }
        if r.recency_lambda < 0.0 {
            return Err(config_error("retrieval.recency_lambda must be >= 0"));
        }

        if self.gap_fill.max_rounds == 0 {
            return Err(config_error("gap_fill.max_rounds must be >= 1"));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.structure.resolution, 0.20);
        assert_eq!(config.graph.same_domain_threshold, 0.45);
    }

    #[test]
    fn test_rejects_zero_round_budget() {
        let mut config = EngineConfig::default();
        config.gap_fill.max_rounds = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = EngineConfig::default();
        config.graph.cross_domain_threshold = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_full_hub_percentile() {
        let mut config = EngineConfig::default();
        config.structure.hub_percentile = 1.0;
        assert!(config.validate().is_err());
    }
}
