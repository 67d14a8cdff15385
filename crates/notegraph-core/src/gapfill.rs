//! Bounded gap-filling retrieval.
//!
//! [`GapFillController`] drives a small state machine per query:
//!
//! ```text
//! Initial ──▶ GapCheck ──▶ Done(GapsClosed | BudgetExhausted | NoProgress | Cancelled)
//!                │  ▲
//!                ▼  │
//!            Refine(gap)
//! ```
//!
//! `Initial` runs retrieval once. `GapCheck` looks for dimensions the plan
//! implies but the result lacks. `Refine` issues one retrieval with a plan
//! redirected at a single gap, merges, and returns to `GapCheck`.
//!
//! Every gap is attempted at most once and `max_rounds` caps the total
//! number of retrieval calls, so the machine always reaches `Done`.
//! Running out of rounds is a normal outcome with best-effort results.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;
use tracing::debug;

use crate::config::GapFillConfig;
use crate::error::Result;
use crate::models::Category;
use crate::plan::{QueryPlan, YearFilter, MAX_YEAR_SPAN};
use crate::retrieval::{rank_order, Candidate, HybridRetriever, RetrievalResult};

/// Something the plan implies the result should cover but doesn't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gap {
    /// Years inside the plan's year range with no candidate.
    MissingYears { years: Vec<i32> },
    /// An expected category with no candidate.
    MissingCategory { category: Category },
    /// Fewer candidates than `min_docs` under a filtered, unrelaxed pool.
    TooFewResults { found: usize, wanted: usize },
}

/// Identity of a gap for the at-most-once rule. Payloads that shift
/// between rounds (the exact missing years, counts) are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GapKey {
    MissingYears,
    MissingCategory(Category),
    TooFewResults,
}

impl Gap {
    fn key(&self) -> GapKey {
        match self {
            Gap::MissingYears { .. } => GapKey::MissingYears,
            Gap::MissingCategory { category } => GapKey::MissingCategory(*category),
            Gap::TooFewResults { .. } => GapKey::TooFewResults,
        }
    }

    /// Whether `candidate` on its own closes this gap.
    fn closed_by(&self, candidate: &Candidate) -> bool {
        match self {
            Gap::MissingYears { years } => candidate.year.is_some_and(|y| years.contains(&y)),
            Gap::MissingCategory { category } => candidate.category == *category,
            Gap::TooFewResults { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFillTermination {
    /// No gaps remain.
    GapsClosed,
    /// The round cap was reached with gaps still open.
    BudgetExhausted,
    /// Every remaining gap has already been attempted.
    NoProgress,
    /// The deadline passed at a round boundary.
    Cancelled,
}

impl fmt::Display for GapFillTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GapFillTermination::GapsClosed => "gaps_closed",
            GapFillTermination::BudgetExhausted => "budget_exhausted",
            GapFillTermination::NoProgress => "no_progress",
            GapFillTermination::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GapFillState {
    Initial,
    GapCheck,
    Refine(Gap),
    Done(GapFillTermination),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GapFillOutcome {
    pub result: RetrievalResult,
    /// Retrieval calls made, including the initial one.
    pub rounds: usize,
    pub termination: GapFillTermination,
    /// Gaps still open when the machine stopped.
    pub open_gaps: Vec<Gap>,
}

pub struct GapFillController<'a> {
    retriever: HybridRetriever<'a>,
    config: &'a GapFillConfig,
}

impl<'a> GapFillController<'a> {
    pub fn new(retriever: HybridRetriever<'a>, config: &'a GapFillConfig) -> Self {
        Self { retriever, config }
    }

    /// Run the state machine to `Done`.
    ///
    /// The initial retrieval always runs; `deadline` is checked only at
    /// round boundaries after it.
    pub fn run(
        &self,
        plan: &QueryPlan,
        query_vector: &[f32],
        query_tokens: &[String],
        deadline: Option<Instant>,
    ) -> Result<GapFillOutcome> {
        let max_rounds = self.config.max_rounds.max(1);
        let mut state = GapFillState::Initial;
        let mut result = RetrievalResult::default();
        let mut rounds = 0;
        let mut attempted: HashSet<GapKey> = HashSet::new();
        let mut protected: HashSet<String> = HashSet::new();
        let mut open_gaps = Vec::new();

        let termination = loop {
            state = match state {
                GapFillState::Initial => {
                    result = self.retriever.retrieve(plan, query_vector, query_tokens)?;
                    rounds = 1;
                    GapFillState::GapCheck
                }
                GapFillState::GapCheck => {
                    open_gaps = find_gaps(plan, &result);
                    debug!(round = rounds, gaps = ?open_gaps, "gap check");
                    if open_gaps.is_empty() {
                        GapFillState::Done(GapFillTermination::GapsClosed)
                    } else if rounds >= max_rounds {
                        GapFillState::Done(GapFillTermination::BudgetExhausted)
                    } else if deadline.is_some_and(|d| Instant::now() >= d) {
                        GapFillState::Done(GapFillTermination::Cancelled)
                    } else {
                        match open_gaps.iter().find(|g| !attempted.contains(&g.key())) {
                            Some(gap) => GapFillState::Refine(gap.clone()),
                            None => GapFillState::Done(GapFillTermination::NoProgress),
                        }
                    }
                }
                GapFillState::Refine(gap) => {
                    attempted.insert(gap.key());
                    rounds += 1;
                    let refined = self.refine_plan(plan, &gap);
                    let extra = self.retriever.retrieve(&refined, query_vector, query_tokens)?;
                    if extra.prefilter_relaxed {
                        debug!(round = rounds, gap = ?gap, "refine round relaxed; discarding");
                    } else {
                        let mut best_closing: Vec<&Candidate> =
                            extra.candidates.iter().filter(|c| gap.closed_by(c)).collect();
                        best_closing.sort_by(|a, b| rank_order(a, b));
                        if let Some(best) = best_closing.first() {
                            protected.insert(best.chunk_id.clone());
                        }
                        result = self.merge(result, extra, plan, &protected);
                    }
                    GapFillState::GapCheck
                }
                GapFillState::Done(termination) => break termination,
            };
        };

        debug!(rounds, %termination, returned = result.len(), "gap filling done");
        Ok(GapFillOutcome {
            result,
            rounds,
            termination,
            open_gaps,
        })
    }

    /// Union by chunk id keeping the higher score, re-ranked and cut to
    /// `max_docs` without evicting protected candidates.
    ///
    /// `extra` was scored under a refined plan; its boosts are re-derived
    /// against `plan` before comparing.
    fn merge(
        &self,
        base: RetrievalResult,
        mut extra: RetrievalResult,
        plan: &QueryPlan,
        protected: &HashSet<String>,
    ) -> RetrievalResult {
        self.retriever.rescore(plan, &mut extra.candidates);
        let total_considered = base.total_considered.max(extra.total_considered);
        let prefilter_relaxed = base.prefilter_relaxed;

        let mut by_id: HashMap<String, Candidate> = HashMap::new();
        for candidate in base.candidates.into_iter().chain(extra.candidates) {
            match by_id.get(&candidate.chunk_id) {
                Some(existing) if existing.score >= candidate.score => {}
                _ => {
                    by_id.insert(candidate.chunk_id.clone(), candidate);
                }
            }
        }

        let mut merged: Vec<Candidate> = by_id.into_values().collect();
        merged.sort_by(rank_order);

        let max = plan.max_docs;
        let pinned = merged
            .iter()
            .filter(|c| protected.contains(&c.chunk_id))
            .count()
            .min(max);
        let mut free = max - pinned;
        merged.retain(|c| {
            if protected.contains(&c.chunk_id) {
                true
            } else if free > 0 {
                free -= 1;
                true
            } else {
                false
            }
        });
        merged.truncate(max);

        let mut result = RetrievalResult {
            candidates: merged,
            total_considered,
            year_matched_count: 0,
            prefilter_relaxed,
        };
        result.recount();
        result
    }

    /// A copy of `plan` redirected at `gap`.
    fn refine_plan(&self, plan: &QueryPlan, gap: &Gap) -> QueryPlan {
        let mut refined = plan.clone();
        match gap {
            Gap::MissingYears { years } => {
                let from = years.iter().copied().min();
                let to = years.iter().copied().max();
                if let (Some(from), Some(to)) = (from, to) {
                    refined.year_filter = Some(YearFilter::Range { from, to });
                    refined.year_window = Some(0);
                }
            }
            Gap::MissingCategory { category } => {
                refined.category_filter = Some(*category);
            }
            Gap::TooFewResults { .. } => match plan.year_filter {
                Some(YearFilter::Exact { .. }) => {
                    let base = plan
                        .year_window
                        .unwrap_or(self.retriever.config().year_window);
                    refined.year_window = Some(base.saturating_add(self.config.widen_step));
                }
                Some(YearFilter::Range { from, to }) => {
                    let step = self.config.widen_step.min(i32::MAX as u32) as i32;
                    let widened = YearFilter::Range {
                        from: from.saturating_sub(step),
                        to: to.saturating_add(step),
                    };
                    if widened.width() <= MAX_YEAR_SPAN {
                        refined.year_filter = Some(widened);
                    }
                }
                None => refined.category_filter = None,
            },
        }
        refined
    }
}

/// Gaps in `result` relative to `plan`, in a fixed order: years, then
/// categories in plan order, then result size.
///
/// Missing years are listed for at most the first [`MAX_YEAR_SPAN`] years
/// of the range; wider ranges fail plan validation.
pub fn find_gaps(plan: &QueryPlan, result: &RetrievalResult) -> Vec<Gap> {
    let mut gaps = Vec::new();

    if let Some(YearFilter::Range { from, to }) = plan.year_filter {
        let present: HashSet<i32> = result.candidates.iter().filter_map(|c| c.year).collect();
        let years: Vec<i32> = (from..=to)
            .take(MAX_YEAR_SPAN as usize)
            .filter(|y| !present.contains(y))
            .collect();
        if !years.is_empty() {
            gaps.push(Gap::MissingYears { years });
        }
    }

    for &category in &plan.expected_categories {
        if !result.candidates.iter().any(|c| c.category == category) {
            gaps.push(Gap::MissingCategory { category });
        }
    }

    let filtered = plan.year_filter.is_some() || plan.category_filter.is_some();
    if filtered && !result.prefilter_relaxed && result.len() < plan.min_docs {
        gaps.push(Gap::TooFewResults {
            found: result.len(),
            wanted: plan.min_docs,
        });
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::lexical::tokenize;
    use crate::models::Chunk;
    use crate::plan::{Difficulty, QueryType};
    use crate::store::ChunkStore;

    fn make_chunk(id: &str, year: Option<i32>, category: Category, vector: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: format!("doc-{}", id),
            doc_order: 0,
            text: "notes".to_string(),
            year,
            category,
            vector,
            tokens: tokenize("notes"),
            trust: None,
        }
    }

    fn category_store() -> ChunkStore {
        ChunkStore::build(
            vec![
                make_chunk("a", Some(2020), Category::Ai, vec![1.0, 0.0]),
                make_chunk("b", Some(2020), Category::Ai, vec![1.0, 0.0]),
                make_chunk("c", Some(2020), Category::Ai, vec![1.0, 0.0]),
                make_chunk("d", Some(2022), Category::Personal, vec![0.6, 0.8]),
            ],
            2,
        )
        .store
    }

    fn plan() -> QueryPlan {
        QueryPlan::new(QueryType::Synthesis, Difficulty::Easy).with_bounds(1, 2)
    }

    fn run(
        store: &ChunkStore,
        gap_fill: &GapFillConfig,
        plan: &QueryPlan,
        deadline: Option<Instant>,
    ) -> GapFillOutcome {
        let retrieval = RetrievalConfig::default();
        let retriever = HybridRetriever::new(store, &retrieval);
        GapFillController::new(retriever, gap_fill)
            .run(plan, &[1.0, 0.0], &[], deadline)
            .unwrap()
    }

    #[test]
    fn test_no_gaps_closes_after_one_round() {
        let store = category_store();
        let outcome = run(&store, &GapFillConfig::default(), &plan(), None);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.termination, GapFillTermination::GapsClosed);
        assert_eq!(outcome.result.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_category_is_pulled_in_and_protected() {
        let store = category_store();
        let p = plan().expect_category(Category::Personal);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.termination, GapFillTermination::GapsClosed);
        assert_eq!(outcome.result.len(), 2);
        assert!(outcome.result.ids().contains(&"d"));
        assert!(outcome.open_gaps.is_empty());
    }

    #[test]
    fn test_unreachable_category_stops_without_progress() {
        let store = category_store();
        let p = plan().expect_category(Category::Travel);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        assert_eq!(outcome.termination, GapFillTermination::NoProgress);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.result.ids(), vec!["a", "b"]);
        assert_eq!(outcome.open_gaps, vec![Gap::MissingCategory { category: Category::Travel }]);
    }

    #[test]
    fn test_budget_exhaustion_is_not_an_error() {
        let store = category_store();
        let p = plan()
            .expect_category(Category::Travel)
            .expect_category(Category::Health);
        let config = GapFillConfig {
            max_rounds: 2,
            ..GapFillConfig::default()
        };
        let outcome = run(&store, &config, &p, None);
        assert_eq!(outcome.termination, GapFillTermination::BudgetExhausted);
        assert_eq!(outcome.rounds, 2);
        assert!(!outcome.result.is_empty());
    }

    #[test]
    fn test_expired_deadline_cancels_after_initial_round() {
        let store = category_store();
        let p = plan().expect_category(Category::Personal);
        let outcome = run(&store, &GapFillConfig::default(), &p, Some(Instant::now()));
        assert_eq!(outcome.termination, GapFillTermination::Cancelled);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.result.len(), 2);
    }

    #[test]
    fn test_missing_years_in_range() {
        let store = category_store();
        let p = QueryPlan::new(QueryType::Temporal, Difficulty::Easy)
            .with_bounds(1, 2)
            .with_year_range(2020, 2022);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        // 2021 has no chunks at all, so the years gap can only partly close.
        assert_eq!(outcome.termination, GapFillTermination::NoProgress);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.result.ids(), vec!["d", "a"]);
        assert_eq!(outcome.result.year_matched_count, 2);
        assert_eq!(outcome.open_gaps, vec![Gap::MissingYears { years: vec![2021] }]);
    }

    #[test]
    fn test_too_few_results_widens_window() {
        let store = category_store();
        let p = plan().with_bounds(2, 4).with_year(2024).with_year_window(0);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        // 2024 has nothing: the pre-filter relaxes, so no TooFewResults gap.
        assert_eq!(outcome.termination, GapFillTermination::GapsClosed);
        assert!(outcome.result.prefilter_relaxed);

        let p = plan().with_bounds(2, 4).with_year(2021).with_year_window(1);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        // Window 1 finds every chunk already; exact year still unmatched.
        assert_eq!(outcome.result.len(), 4);
        assert_eq!(outcome.rounds, 1);

        let p = plan()
            .with_bounds(3, 4)
            .with_category(Category::Personal)
            .with_year(2022)
            .with_year_window(0);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.result.ids()[0], "d");
    }

    #[test]
    fn test_find_gaps_order() {
        let p = QueryPlan::new(QueryType::Temporal, Difficulty::Easy)
            .with_year_range(2020, 2021)
            .expect_category(Category::Work);
        let gaps = find_gaps(&p, &RetrievalResult::default());
        assert_eq!(
            gaps,
            vec![
                Gap::MissingYears { years: vec![2020, 2021] },
                Gap::MissingCategory { category: Category::Work },
                Gap::TooFewResults { found: 0, wanted: 10 },
            ]
        );
    }

    #[test]
    fn test_extreme_year_range_is_rejected_before_gap_check() {
        let store = category_store();
        let retrieval = RetrievalConfig::default();
        let gap_fill = GapFillConfig::default();
        let p = QueryPlan::new(QueryType::Temporal, Difficulty::Easy)
            .with_year_range(i32::MIN, i32::MAX);
        let err = GapFillController::new(HybridRetriever::new(&store, &retrieval), &gap_fill)
            .run(&p, &[1.0, 0.0], &[], None)
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Validation { .. }), "got {:?}", err);

        let started = Instant::now();
        let gaps = find_gaps(&p, &RetrievalResult::default());
        assert!(started.elapsed().as_secs() < 1);
        match &gaps[0] {
            Gap::MissingYears { years } => assert_eq!(years.len() as u64, MAX_YEAR_SPAN),
            other => panic!("unexpected gap {:?}", other),
        }
    }

    #[test]
    fn test_refined_category_boost_does_not_leak_into_merge() {
        let store = ChunkStore::build(
            vec![
                make_chunk("a", Some(2020), Category::Ai, vec![1.0, 0.0]),
                make_chunk("b", Some(2020), Category::Ai, vec![0.95, 0.31]),
                make_chunk("d", Some(2020), Category::Personal, vec![0.2, 0.98]),
            ],
            2,
        )
        .store;
        let p = plan().expect_category(Category::Personal);
        let outcome = run(&store, &GapFillConfig::default(), &p, None);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.termination, GapFillTermination::GapsClosed);
        // d is kept for closing the gap but ranks below the stronger match.
        assert_eq!(outcome.result.ids(), vec!["a", "d"]);
        for c in &outcome.result.candidates {
            assert_eq!(c.breakdown.category_boost, 0.0, "{} kept a refine boost", c.chunk_id);
            let expected = c.breakdown.fused
                + c.breakdown.year_boost
                + c.breakdown.recency_boost
                + c.breakdown.trust_boost;
            assert!((c.score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_terminates_within_cap_for_every_plan_shape() {
        let store = category_store();
        for max_rounds in 1..=4 {
            let config = GapFillConfig {
                max_rounds,
                ..GapFillConfig::default()
            };
            let p = QueryPlan::new(QueryType::Temporal, Difficulty::Hard)
                .with_year_range(1990, 2030)
                .with_category(Category::Finance)
                .expect_category(Category::Travel)
                .expect_category(Category::Health)
                .expect_category(Category::Work);
            let outcome = run(&store, &config, &p, None);
            assert!(outcome.rounds <= max_rounds, "rounds={} cap={}", outcome.rounds, max_rounds);
            assert_ne!(outcome.termination, GapFillTermination::GapsClosed);
        }
    }
}
