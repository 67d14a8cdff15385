//! Confidence tiers for downstream citation behaviour.
//!
//! The tier depends only on what was actually retrieved: whether the plan
//! had a year filter, whether any candidate carries a matching year, and
//! whether any candidate is relevant (non-zero fused score). Document
//! bounds and round counts are never consulted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::QueryPlan;
use crate::retrieval::RetrievalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    /// A year filter was set and at least one candidate has that year.
    YearMatched,
    /// A year filter was set, nothing matches it, but relevant content exists.
    PartialMatch,
    /// No year filter and relevant content exists.
    GoodMatch,
    NoMatch,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::YearMatched => "YEAR_MATCHED",
            ConfidenceTier::PartialMatch => "PARTIAL_MATCH",
            ConfidenceTier::GoodMatch => "GOOD_MATCH",
            ConfidenceTier::NoMatch => "NO_MATCH",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(result: &RetrievalResult, plan: &QueryPlan) -> ConfidenceTier {
    let relevant = result.candidates.iter().any(|c| c.breakdown.fused > 0.0);

    match plan.year_filter {
        Some(filter) => {
            let matched = result
                .candidates
                .iter()
                .any(|c| c.year.is_some_and(|y| filter.matches(y)));
            if matched {
                ConfidenceTier::YearMatched
            } else if relevant {
                ConfidenceTier::PartialMatch
            } else {
                ConfidenceTier::NoMatch
            }
        }
        None if relevant => ConfidenceTier::GoodMatch,
        None => ConfidenceTier::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::plan::{Difficulty, QueryType};
    use crate::retrieval::{Candidate, ScoreBreakdown};

    fn make_candidate(id: &str, year: Option<i32>) -> Candidate {
        Candidate {
            index: 0,
            chunk_id: id.to_string(),
            document_id: String::new(),
            text: String::new(),
            year,
            category: Category::Ai,
            score: 0.01,
            year_matched: false,
            breakdown: ScoreBreakdown {
                fused: 0.01,
                ..ScoreBreakdown::default()
            },
        }
    }

    fn result_with_years(years: &[Option<i32>]) -> RetrievalResult {
        RetrievalResult {
            candidates: years
                .iter()
                .enumerate()
                .map(|(i, &y)| make_candidate(&format!("c{}", i), y))
                .collect(),
            ..RetrievalResult::default()
        }
    }

    fn plan() -> QueryPlan {
        QueryPlan::new(QueryType::Specific, Difficulty::Easy)
    }

    #[test]
    fn test_year_matched() {
        let result = result_with_years(&[
            Some(2019),
            Some(2021),
            Some(2022),
            None,
            Some(2020),
        ]);
        assert_eq!(classify(&result, &plan().with_year(2021)), ConfidenceTier::YearMatched);
    }

    #[test]
    fn test_partial_match() {
        let result = result_with_years(&[Some(2019), Some(2022)]);
        assert_eq!(classify(&result, &plan().with_year(2021)), ConfidenceTier::PartialMatch);
    }

    #[test]
    fn test_good_match() {
        let result = result_with_years(&[Some(2019)]);
        assert_eq!(classify(&result, &plan()), ConfidenceTier::GoodMatch);
    }

    #[test]
    fn test_no_match() {
        let result = RetrievalResult::default();
        assert_eq!(classify(&result, &plan()), ConfidenceTier::NoMatch);
        assert_eq!(classify(&result, &plan().with_year(2021)), ConfidenceTier::NoMatch);
    }

    #[test]
    fn test_zero_fused_is_not_relevant() {
        let mut result = result_with_years(&[Some(2019)]);
        result.candidates[0].breakdown.fused = 0.0;
        assert_eq!(classify(&result, &plan()), ConfidenceTier::NoMatch);
        assert_eq!(classify(&result, &plan().with_year(2021)), ConfidenceTier::NoMatch);
    }

    #[test]
    fn test_range_filter_matches_inside() {
        let result = result_with_years(&[Some(2020)]);
        assert_eq!(
            classify(&result, &plan().with_year_range(2019, 2021)),
            ConfidenceTier::YearMatched
        );
    }

    #[test]
    fn test_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ConfidenceTier::YearMatched).unwrap(),
            "\"YEAR_MATCHED\""
        );
        assert_eq!(ConfidenceTier::PartialMatch.to_string(), "PARTIAL_MATCH");
    }
}
