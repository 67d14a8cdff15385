//! Hybrid retrieval with reciprocal rank fusion and metadata boosts.
//!
//! The retriever reads only from the shared [`ChunkStore`] (and optionally
//! the graph), so any number of queries can run against it concurrently.
//! The caller embeds and tokenizes the query; an empty query vector runs
//! lexical-only.
//!
//! # Scoring Pipeline
//!
//! 1. Pre-filter the corpus by the plan's year span and category. An empty
//!    pool falls back to the whole corpus and marks the result relaxed.
//! 2. Dense ranking: cosine similarity above `min_dense_similarity`.
//! 3. Lexical ranking: BM25 score above zero.
//! 4. Fuse: `fused(d) = Σ_r weight_r / (k + rank_r(d))`, ranks 1-based; a
//!    chunk absent from a ranking gets nothing from it.
//! 5. Optionally pull graph neighbours of the top fused chunks in.
//! 6. Boost: year match, category match, recency decay, trust.
//! 7. Sort by score (desc), year (desc, undated last), chunk id (asc).
//! 8. Truncate to the plan's `max_docs`.
//!
//! Steps 2 and 3 are independent and run on separate threads once the pool
//! reaches `parallel_min_candidates`.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_with_norms, l2_norm};
use crate::error::{Error, Result};
use crate::graph::KnowledgeGraph;
use crate::models::{Category, Chunk};
use crate::plan::QueryPlan;
use crate::store::ChunkStore;
use crate::structure::GraphStructure;

/// How a candidate's score was assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Cosine similarity, if the chunk made the dense ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_rank: Option<usize>,
    /// BM25 score, if the chunk made the lexical ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,
    pub fused: f64,
    pub year_boost: f64,
    pub category_boost: f64,
    pub recency_boost: f64,
    pub trust_boost: f64,
    /// Reached through a graph edge rather than either ranking.
    pub expanded: bool,
}

/// A scored chunk. Lives for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Store index of the chunk.
    #[serde(skip)]
    pub index: usize,
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub year: Option<i32>,
    pub category: Category,
    /// Fused score plus boosts.
    pub score: f64,
    /// Whether the year satisfies the plan's year filter.
    pub year_matched: bool,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub candidates: Vec<Candidate>,
    /// Size of the pool scored after pre-filtering.
    pub total_considered: usize,
    pub year_matched_count: usize,
    /// The pre-filter matched nothing and the whole corpus was used.
    pub prefilter_relaxed: bool,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    pub(crate) fn recount(&mut self) {
        self.year_matched_count = self.candidates.iter().filter(|c| c.year_matched).count();
    }
}

/// Final ordering: score (desc), year (desc, undated last), chunk id (asc).
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.year, b.year) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Weighted reciprocal rank fusion.
///
/// Each ranking is best-first; the item at position `p` contributes
/// `weight / (k + p + 1)`.
pub fn reciprocal_rank_fusion<T>(rankings: &[(&[T], f64)], k: f64) -> HashMap<T, f64>
where
    T: Copy + Eq + Hash,
{
    let mut fused: HashMap<T, f64> = HashMap::new();
    for (ranking, weight) in rankings {
        for (pos, item) in ranking.iter().enumerate() {
            *fused.entry(*item).or_insert(0.0) += weight / (k + (pos + 1) as f64);
        }
    }
    fused
}

/// Scores one query against the store.
pub struct HybridRetriever<'a> {
    store: &'a ChunkStore,
    graph: Option<(&'a KnowledgeGraph, &'a GraphStructure)>,
    config: &'a RetrievalConfig,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(store: &'a ChunkStore, config: &'a RetrievalConfig) -> Self {
        Self {
            store,
            graph: None,
            config,
        }
    }

    /// Enable graph expansion sources. Only used when
    /// `config.graph_expansion` is set.
    pub fn with_graph(mut self, graph: &'a KnowledgeGraph, structure: &'a GraphStructure) -> Self {
        self.graph = Some((graph, structure));
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        self.config
    }

    pub fn retrieve(
        &self,
        plan: &QueryPlan,
        query_vector: &[f32],
        query_tokens: &[String],
    ) -> Result<RetrievalResult> {
        plan.validate()?;
        if !query_vector.is_empty() && query_vector.len() != self.store.dimensions() {
            return Err(Error::validation(
                "query_vector",
                format!(
                    "expected {} dimensions, got {}",
                    self.store.dimensions(),
                    query_vector.len()
                ),
            ));
        }
        if self.store.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let (pool, prefilter_relaxed) = self.prefilter(plan);
        if prefilter_relaxed {
            debug!(
                year_filter = ?plan.year_filter,
                category = ?plan.category_filter,
                "pre-filter matched nothing; using full corpus"
            );
        }

        let (dense, lexical) = if pool.len() >= self.config.parallel_min_candidates {
            std::thread::scope(|s| {
                let dense = s.spawn(|| self.dense_ranking(&pool, query_vector));
                let lexical = self.lexical_ranking(&pool, query_tokens);
                (
                    dense.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
                    lexical,
                )
            })
        } else {
            (
                self.dense_ranking(&pool, query_vector),
                self.lexical_ranking(&pool, query_tokens),
            )
        };

        let dense_ids: Vec<usize> = dense.iter().map(|&(i, _)| i).collect();
        let lexical_ids: Vec<usize> = lexical.iter().map(|&(i, _)| i).collect();
        let fused = reciprocal_rank_fusion(
            &[
                (dense_ids.as_slice(), self.config.dense_weight),
                (lexical_ids.as_slice(), self.config.sparse_weight),
            ],
            self.config.rrf_k,
        );

        let mut breakdowns: HashMap<usize, ScoreBreakdown> = HashMap::new();
        for (rank, &(i, score)) in dense.iter().enumerate() {
            let b = breakdowns.entry(i).or_default();
            b.dense = Some(score);
            b.dense_rank = Some(rank + 1);
        }
        for (rank, &(i, score)) in lexical.iter().enumerate() {
            let b = breakdowns.entry(i).or_default();
            b.lexical = Some(score);
            b.lexical_rank = Some(rank + 1);
        }
        for (i, score) in &fused {
            if let Some(b) = breakdowns.get_mut(i) {
                b.fused = *score;
            }
        }
        breakdowns.retain(|_, b| b.fused > 0.0);

        if self.config.graph_expansion {
            self.expand(&pool, &mut breakdowns);
        }

        let newest = self.store.newest_year();
        let mut candidates: Vec<Candidate> = breakdowns
            .into_iter()
            .map(|(i, breakdown)| self.candidate(i, breakdown, plan, newest))
            .collect();
        candidates.sort_by(rank_order);
        candidates.truncate(plan.max_docs);

        let mut result = RetrievalResult {
            candidates,
            total_considered: pool.len(),
            year_matched_count: 0,
            prefilter_relaxed,
        };
        result.recount();

        debug!(
            pool = result.total_considered,
            dense = dense.len(),
            lexical = lexical.len(),
            returned = result.len(),
            year_matched = result.year_matched_count,
            "retrieval complete"
        );
        Ok(result)
    }

    /// Indices passing the plan's filters, or the whole corpus when none do.
    fn prefilter(&self, plan: &QueryPlan) -> (Vec<usize>, bool) {
        let window = plan.year_window.unwrap_or(self.config.year_window);
        let span = plan.year_filter.map(|f| f.span(window));

        let pool: Vec<usize> = self
            .store
            .chunks()
            .iter()
            .enumerate()
            .filter(|(_, c)| match span {
                Some((lo, hi)) => c.year.is_some_and(|y| (lo..=hi).contains(&y)),
                None => true,
            })
            .filter(|(_, c)| plan.category_filter.map_or(true, |cat| c.category == cat))
            .map(|(i, _)| i)
            .collect();

        if pool.is_empty() {
            ((0..self.store.len()).collect(), true)
        } else {
            (pool, false)
        }
    }

    fn dense_ranking(&self, pool: &[usize], query_vector: &[f32]) -> Vec<(usize, f64)> {
        if query_vector.is_empty() {
            return Vec::new();
        }
        let q_norm = l2_norm(query_vector);
        let mut ranked: Vec<(usize, f64)> = pool
            .iter()
            .map(|&i| {
                let sim = cosine_with_norms(
                    query_vector,
                    q_norm,
                    &self.store.get(i).vector,
                    self.store.norm(i),
                );
                (i, sim as f64)
            })
            .filter(|&(_, sim)| sim > self.config.min_dense_similarity)
            .collect();
        sort_ranking(&mut ranked);
        ranked
    }

    fn lexical_ranking(&self, pool: &[usize], query_tokens: &[String]) -> Vec<(usize, f64)> {
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let index = self.store.lexical();
        let mut ranked: Vec<(usize, f64)> = pool
            .iter()
            .map(|&i| {
                let score =
                    index.score(i, query_tokens, self.config.bm25_k1, self.config.bm25_b);
                (i, score)
            })
            .filter(|&(_, score)| score > 0.0)
            .collect();
        sort_ranking(&mut ranked);
        ranked
    }

    /// Add pool neighbours of the strongest fused chunks.
    fn expand(&self, pool: &[usize], breakdowns: &mut HashMap<usize, ScoreBreakdown>) {
        let Some((graph, structure)) = self.graph else {
            return;
        };
        if graph.node_count() != self.store.len() {
            return;
        }

        let mut in_pool = vec![false; self.store.len()];
        for &i in pool {
            in_pool[i] = true;
        }

        let mut seeds: Vec<(usize, f64)> = breakdowns.iter().map(|(&i, b)| (i, b.fused)).collect();
        sort_ranking(&mut seeds);
        seeds.truncate(self.config.expansion_seeds);

        let mut pulled: HashMap<usize, f64> = HashMap::new();
        for (seed, seed_score) in seeds {
            let mut reach: Vec<(usize, f64, bool)> = graph
                .neighbors(seed)
                .filter(|&(j, _)| in_pool[j] && !breakdowns.contains_key(&j))
                .map(|(j, e)| {
                    let score = seed_score * e.weight as f64 * self.config.expansion_decay;
                    (j, score, structure.is_hub(j))
                })
                .collect();
            reach.sort_by(|a, b| {
                b.1.total_cmp(&a.1)
                    .then_with(|| b.2.cmp(&a.2))
                    .then_with(|| a.0.cmp(&b.0))
            });
            for (j, score, _) in reach.into_iter().take(self.config.expansion_fanout) {
                let best = pulled.entry(j).or_insert(0.0);
                *best = best.max(score);
            }
        }

        debug!(expanded = pulled.len(), "graph expansion");
        for (j, score) in pulled {
            if score > 0.0 {
                breakdowns.insert(
                    j,
                    ScoreBreakdown {
                        fused: score,
                        expanded: true,
                        ..ScoreBreakdown::default()
                    },
                );
            }
        }
    }

    /// Re-derive boosts and scores of `candidates` against `plan`.
    ///
    /// Candidates scored under a different plan keep their fused score
    /// but lose any boost `plan` does not grant.
    pub fn rescore(&self, plan: &QueryPlan, candidates: &mut [Candidate]) {
        let newest = self.store.newest_year();
        for candidate in candidates {
            self.apply_boosts(plan, newest, candidate);
        }
    }

    fn candidate(
        &self,
        index: usize,
        breakdown: ScoreBreakdown,
        plan: &QueryPlan,
        newest_year: Option<i32>,
    ) -> Candidate {
        let chunk: &Chunk = self.store.get(index);
        let mut candidate = Candidate {
            index,
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            text: chunk.text.clone(),
            year: chunk.year,
            category: chunk.category,
            score: breakdown.fused,
            year_matched: false,
            breakdown,
        };
        self.apply_boosts(plan, newest_year, &mut candidate);
        candidate
    }

    fn apply_boosts(&self, plan: &QueryPlan, newest_year: Option<i32>, candidate: &mut Candidate) {
        let chunk: &Chunk = self.store.get(candidate.index);
        let breakdown = &mut candidate.breakdown;
        breakdown.year_boost = 0.0;
        breakdown.category_boost = 0.0;
        breakdown.recency_boost = 0.0;
        breakdown.trust_boost = 0.0;

        candidate.year_matched = match (plan.year_filter, chunk.year) {
            (Some(filter), Some(year)) => filter.matches(year),
            _ => false,
        };
        if candidate.year_matched {
            breakdown.year_boost = self.config.year_boost;
        }
        if plan.category_filter == Some(chunk.category) {
            breakdown.category_boost = self.config.category_boost;
        }
        if self.config.recency_weight > 0.0 {
            let reference = match plan.year_filter {
                Some(filter) => chunk.year.map(|y| filter.nearest(y)),
                None => newest_year,
            };
            if let (Some(year), Some(reference)) = (chunk.year, reference) {
                let delta = (i64::from(year) - i64::from(reference)).abs() as f64;
                breakdown.recency_boost =
                    self.config.recency_weight * (-self.config.recency_lambda * delta).exp();
            }
        }
        if self.config.trust_weight > 0.0 {
            breakdown.trust_boost = self.config.trust_weight * chunk.trust.unwrap_or(0.0) as f64;
        }

        candidate.score = breakdown.fused
            + breakdown.year_boost
            + breakdown.category_boost
            + breakdown.recency_boost
            + breakdown.trust_boost;
    }
}

/// Best first; equal scores fall back to store index, i.e. chunk id.
fn sort_ranking(ranked: &mut [(usize, f64)]) {
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::{Edge, EdgeType};
    use crate::lexical::tokenize;
    use crate::plan::{Difficulty, QueryType};
    use crate::structure::StructureExtractor;

    fn make_chunk(
        id: &str,
        year: Option<i32>,
        category: Category,
        vector: Vec<f32>,
        text: &str,
    ) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: format!("doc-{}", id),
            doc_order: 0,
            text: text.to_string(),
            year,
            category,
            vector,
            tokens: tokenize(text),
            trust: None,
        }
    }

    fn make_store(chunks: Vec<Chunk>) -> ChunkStore {
        let dims = chunks.first().map_or(2, |c| c.vector.len());
        ChunkStore::build(chunks, dims).store
    }

    fn plan() -> QueryPlan {
        QueryPlan::new(QueryType::Specific, Difficulty::Easy)
    }

    fn candidate(id: &str, score: f64, year: Option<i32>) -> Candidate {
        Candidate {
            index: 0,
            chunk_id: id.to_string(),
            document_id: String::new(),
            text: String::new(),
            year,
            category: Category::Other,
            score,
            year_matched: false,
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn test_rrf_closed_form() {
        let dense = ["a", "b", "c"];
        let sparse = ["c", "a"];
        let fused = reciprocal_rank_fusion(&[(&dense[..], 1.0), (&sparse[..], 0.5)], 60.0);
        assert!((fused["a"] - (1.0 / 61.0 + 0.5 / 62.0)).abs() < 1e-12);
        assert!((fused["b"] - 1.0 / 62.0).abs() < 1e-12);
        assert!((fused["c"] - (1.0 / 63.0 + 0.5 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rank_order_tie_breaks() {
        let mut cands = vec![
            candidate("b", 1.0, Some(2020)),
            candidate("a", 1.0, Some(2020)),
            candidate("c", 1.0, None),
            candidate("d", 1.0, Some(2023)),
            candidate("e", 2.0, None),
        ];
        cands.sort_by(rank_order);
        let ids: Vec<&str> = cands.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["e", "d", "a", "b", "c"]);
    }

    #[test]
    fn test_rejects_wrong_query_dimensions() {
        let store = make_store(vec![make_chunk("a", None, Category::Ai, vec![1.0, 0.0], "rust")]);
        let config = RetrievalConfig::default();
        let err = HybridRetriever::new(&store, &config)
            .retrieve(&plan(), &[1.0, 0.0, 0.0], &[])
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "query_vector"));
    }

    #[test]
    fn test_empty_store_returns_empty_result() {
        let store = ChunkStore::default();
        let config = RetrievalConfig::default();
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan(), &[], &tokenize("anything"))
            .unwrap();
        assert!(result.is_empty());
        assert!(!result.prefilter_relaxed);
    }

    #[test]
    fn test_lexical_only_without_vector() {
        let store = make_store(vec![
            make_chunk("a", None, Category::Ai, vec![1.0, 0.0], "rust ownership notes"),
            make_chunk("b", None, Category::Ai, vec![0.0, 1.0], "garden tomatoes"),
        ]);
        let config = RetrievalConfig::default();
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan(), &[], &tokenize("rust"))
            .unwrap();
        assert_eq!(result.ids(), vec!["a"]);
        assert_eq!(result.candidates[0].breakdown.dense, None);
        assert!((result.candidates[0].score - 0.5 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_prefilter_window_and_relaxation() {
        let store = make_store(vec![
            make_chunk("a", Some(2018), Category::Ai, vec![1.0, 0.0], "x"),
            make_chunk("b", Some(2020), Category::Ai, vec![1.0, 0.0], "x"),
            make_chunk("c", Some(2024), Category::Ai, vec![1.0, 0.0], "x"),
            make_chunk("d", None, Category::Ai, vec![1.0, 0.0], "x"),
        ]);
        let config = RetrievalConfig::default();
        let retriever = HybridRetriever::new(&store, &config);

        let result = retriever.retrieve(&plan().with_year(2020), &[1.0, 0.0], &[]).unwrap();
        assert_eq!(result.total_considered, 2);
        assert!(!result.prefilter_relaxed);
        assert_eq!(result.ids(), vec!["b", "a"]);

        let narrow = retriever
            .retrieve(&plan().with_year(2020).with_year_window(0), &[1.0, 0.0], &[])
            .unwrap();
        assert_eq!(narrow.ids(), vec!["b"]);

        let relaxed = retriever.retrieve(&plan().with_year(1999), &[1.0, 0.0], &[]).unwrap();
        assert!(relaxed.prefilter_relaxed);
        assert_eq!(relaxed.total_considered, 4);
        assert_eq!(relaxed.year_matched_count, 0);
    }

    #[test]
    fn test_year_match_outranks_identical_chunk() {
        let store = make_store(vec![
            make_chunk("a", Some(2021), Category::Ai, vec![1.0, 0.0], "rust notes"),
            make_chunk("b", Some(2020), Category::Ai, vec![1.0, 0.0], "rust notes"),
        ]);
        let config = RetrievalConfig::default();
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan().with_year(2020), &[1.0, 0.0], &tokenize("rust"))
            .unwrap();
        assert_eq!(result.candidates[0].chunk_id, "b");
        assert!(result.candidates[0].year_matched);
        assert!((result.candidates[0].breakdown.year_boost - 0.5).abs() < 1e-12);
        assert_eq!(result.year_matched_count, 1);
    }

    #[test]
    fn test_category_filter_and_boost() {
        let store = make_store(vec![
            make_chunk("a", None, Category::Ai, vec![1.0, 0.0], "x"),
            make_chunk("b", None, Category::Personal, vec![1.0, 0.0], "x"),
        ]);
        let config = RetrievalConfig::default();
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan().with_category(Category::Personal), &[1.0, 0.0], &[])
            .unwrap();
        assert_eq!(result.ids(), vec!["b"]);
        assert!((result.candidates[0].breakdown.category_boost - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_dense_threshold_excludes_orthogonal() {
        let store = make_store(vec![
            make_chunk("a", None, Category::Ai, vec![1.0, 0.0], "x"),
            make_chunk("b", None, Category::Ai, vec![0.0, 1.0], "x"),
        ]);
        let config = RetrievalConfig::default();
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan(), &[1.0, 0.0], &[])
            .unwrap();
        assert_eq!(result.ids(), vec!["a"]);
    }

    #[test]
    fn test_truncates_to_max_docs() {
        let chunks = (0..20)
            .map(|i| {
                let vector = vec![1.0, i as f32 / 20.0];
                make_chunk(&format!("c{:02}", i), None, Category::Ai, vector, "x")
            })
            .collect();
        let store = make_store(chunks);
        let config = RetrievalConfig::default();
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan().with_bounds(1, 4), &[1.0, 0.0], &[])
            .unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.candidates[0].chunk_id, "c00");
    }

    #[test]
    fn test_parallel_scoring_matches_sequential() {
        let chunks = (0..50)
            .map(|i| {
                make_chunk(
                    &format!("c{:02}", i),
                    Some(2015 + i % 8),
                    Category::ALL[i as usize % 9],
                    vec![1.0, (i % 7) as f32 / 7.0],
                    if i % 3 == 0 { "rust async notes" } else { "walk in the park" },
                )
            })
            .collect();
        let store = make_store(chunks);
        let sequential = RetrievalConfig::default();
        let parallel = RetrievalConfig {
            parallel_min_candidates: 0,
            ..RetrievalConfig::default()
        };
        let p = plan().with_bounds(5, 30);
        let tokens = tokenize("rust notes");
        let a = HybridRetriever::new(&store, &sequential)
            .retrieve(&p, &[1.0, 0.3], &tokens)
            .unwrap();
        let b = HybridRetriever::new(&store, &parallel)
            .retrieve(&p, &[1.0, 0.3], &tokens)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_recency_and_trust_boosts() {
        let mut trusted = make_chunk("b", Some(2020), Category::Ai, vec![1.0, 0.0], "x");
        trusted.trust = Some(1.0);
        let store = make_store(vec![
            make_chunk("a", Some(2024), Category::Ai, vec![1.0, 0.0], "x"),
            trusted,
        ]);
        let config = RetrievalConfig {
            recency_weight: 0.1,
            trust_weight: 0.05,
            ..RetrievalConfig::default()
        };
        let result = HybridRetriever::new(&store, &config)
            .retrieve(&plan(), &[1.0, 0.0], &[])
            .unwrap();
        let a = &result.candidates.iter().find(|c| c.chunk_id == "a").unwrap().breakdown;
        let b = &result.candidates.iter().find(|c| c.chunk_id == "b").unwrap().breakdown;
        assert!((a.recency_boost - 0.1).abs() < 1e-12);
        assert!((b.recency_boost - 0.1 * (-0.4f64).exp()).abs() < 1e-12);
        assert!((b.trust_boost - 0.05).abs() < 1e-12);
        assert_eq!(a.trust_boost, 0.0);
    }

    #[test]
    fn test_graph_expansion_pulls_neighbours() {
        let store = make_store(vec![
            make_chunk("a", None, Category::Ai, vec![1.0, 0.0], "rust notes"),
            make_chunk("b", None, Category::Ai, vec![0.0, 1.0], "garden"),
            make_chunk("c", None, Category::Ai, vec![0.0, 1.0], "garden"),
        ]);
        let edges = vec![Edge {
            source: "a".to_string(),
            target: "b".to_string(),
            edge_type: EdgeType::SameTopic,
            weight: 0.8,
        }];
        let graph = KnowledgeGraph::build(&store, edges).unwrap();
        let categories: Vec<Category> = store.chunks().iter().map(|c| c.category).collect();
        let structure = StructureExtractor::new(Default::default()).extract(&graph, &categories);

        let config = RetrievalConfig {
            graph_expansion: true,
            ..RetrievalConfig::default()
        };
        let result = HybridRetriever::new(&store, &config)
            .with_graph(&graph, &structure)
            .retrieve(&plan(), &[], &tokenize("rust"))
            .unwrap();
        assert_eq!(result.ids(), vec!["a", "b"]);
        let b = &result.candidates[1];
        assert!(b.breakdown.expanded);
        assert!((b.score - (0.5 / 61.0) * 0.8 * 0.5).abs() < 1e-6);

        let off = RetrievalConfig::default();
        let plain = HybridRetriever::new(&store, &off)
            .with_graph(&graph, &structure)
            .retrieve(&plan(), &[], &tokenize("rust"))
            .unwrap();
        assert_eq!(plain.ids(), vec!["a"]);
    }
}
