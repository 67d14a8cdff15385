//! Query plans.
//!
//! A [`QueryPlan`] is produced by query analysis upstream and consumed
//! read-only by retrieval. Query type and difficulty are closed enums; the
//! document-count bounds for each pair come from one explicit table,
//! [`doc_bounds`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::lexical::tokenize;
use crate::models::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Specific,
    Temporal,
    Synthesis,
    Comparison,
    Exploratory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl QueryType {
    pub const ALL: [QueryType; 5] = [
        QueryType::Specific,
        QueryType::Temporal,
        QueryType::Synthesis,
        QueryType::Comparison,
        QueryType::Exploratory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Specific => "specific",
            QueryType::Temporal => "temporal",
            QueryType::Synthesis => "synthesis",
            QueryType::Comparison => "comparison",
            QueryType::Exploratory => "exploratory",
        }
    }
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        QueryType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| {
                Error::validation(
                    "query_type",
                    format!(
                        "unknown query type '{}'. Must be one of: {}",
                        s,
                        QueryType::ALL.map(|t| t.as_str()).join(", ")
                    ),
                )
            })
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Difficulty::ALL
            .into_iter()
            .find(|d| d.as_str() == needle)
            .ok_or_else(|| {
                Error::validation(
                    "difficulty",
                    format!("unknown difficulty '{}'. Must be one of: easy, medium, hard", s),
                )
            })
    }
}

/// Inclusive document-count bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocBounds {
    pub min: usize,
    pub max: usize,
}

const fn bounds(min: usize, max: usize) -> DocBounds {
    DocBounds { min, max }
}

/// Document-count bounds for a query type and difficulty.
pub fn doc_bounds(query_type: QueryType, difficulty: Difficulty) -> DocBounds {
    use Difficulty::*;
    use QueryType::*;
    match (query_type, difficulty) {
        (Specific, Easy) => bounds(5, 10),
        (Specific, Medium) => bounds(6, 10),
        (Specific, Hard) => bounds(8, 12),
        (Temporal, _) => bounds(10, 15),
        (Synthesis, Easy | Medium) => bounds(8, 12),
        (Synthesis, Hard) => bounds(10, 15),
        (Comparison, Easy) => bounds(6, 12),
        (Comparison, Medium) => bounds(8, 12),
        (Comparison, Hard) => bounds(10, 15),
        (Exploratory, _) => bounds(8, 12),
    }
}

/// Widest year range a plan may ask for, in years.
pub const MAX_YEAR_SPAN: u64 = 1000;

/// Temporal constraint on a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum YearFilter {
    Exact { year: i32 },
    Range { from: i32, to: i32 },
}

impl YearFilter {
    /// Whether `year` satisfies the filter itself (no window).
    pub fn matches(&self, year: i32) -> bool {
        match *self {
            YearFilter::Exact { year: y } => year == y,
            YearFilter::Range { from, to } => (from..=to).contains(&year),
        }
    }

    /// Number of years the filter itself covers.
    pub fn width(&self) -> u64 {
        match *self {
            YearFilter::Exact { .. } => 1,
            YearFilter::Range { from, to } => (i64::from(to) - i64::from(from) + 1).max(0) as u64,
        }
    }

    /// Inclusive pre-filter span. `window` widens an exact year on both
    /// sides; a range is taken as given.
    pub fn span(&self, window: u32) -> (i32, i32) {
        match *self {
            YearFilter::Exact { year } => {
                let w = window.min(i32::MAX as u32) as i32;
                (year.saturating_sub(w), year.saturating_add(w))
            }
            YearFilter::Range { from, to } => (from, to),
        }
    }

    /// Year of the filter closest to `year`.
    pub fn nearest(&self, year: i32) -> i32 {
        match *self {
            YearFilter::Exact { year: y } => y,
            YearFilter::Range { from, to } => year.clamp(from, to),
        }
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::Exact { year } => write!(f, "{}", year),
            YearFilter::Range { from, to } => write!(f, "{}-{}", from, to),
        }
    }
}

/// Retrieval instructions for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub query_type: QueryType,
    pub difficulty: Difficulty,
    pub min_docs: usize,
    pub max_docs: usize,
    #[serde(default)]
    pub year_filter: Option<YearFilter>,
    #[serde(default)]
    pub category_filter: Option<Category>,
    /// Categories a complete answer should draw on (gap-filling targets).
    #[serde(default)]
    pub expected_categories: Vec<Category>,
    /// Extra query terms from query expansion, added to the lexical query.
    #[serde(default)]
    pub expanded_terms: Vec<String>,
    /// Overrides the configured pre-filter window around an exact year.
    #[serde(default)]
    pub year_window: Option<u32>,
}

impl QueryPlan {
    /// A plan with bounds from [`doc_bounds`] and no filters.
    pub fn new(query_type: QueryType, difficulty: Difficulty) -> Self {
        let DocBounds { min, max } = doc_bounds(query_type, difficulty);
        Self {
            query_type,
            difficulty,
            min_docs: min,
            max_docs: max,
            year_filter: None,
            category_filter: None,
            expected_categories: Vec::new(),
            expanded_terms: Vec::new(),
            year_window: None,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year_filter = Some(YearFilter::Exact { year });
        self
    }

    pub fn with_year_range(mut self, from: i32, to: i32) -> Self {
        self.year_filter = Some(YearFilter::Range { from, to });
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category_filter = Some(category);
        self
    }

    pub fn expect_category(mut self, category: Category) -> Self {
        if !self.expected_categories.contains(&category) {
            self.expected_categories.push(category);
        }
        self
    }

    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expanded_terms.extend(terms.into_iter().map(Into::into));
        self
    }

    pub fn with_bounds(mut self, min_docs: usize, max_docs: usize) -> Self {
        self.min_docs = min_docs;
        self.max_docs = max_docs;
        self
    }

    pub fn with_year_window(mut self, window: u32) -> Self {
        self.year_window = Some(window);
        self
    }

    /// Reject plans retrieval cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.min_docs == 0 {
            return Err(Error::validation("min_docs", "must be at least 1"));
        }
        if self.max_docs < self.min_docs {
            return Err(Error::validation(
                "max_docs",
                format!("{} is below min_docs {}", self.max_docs, self.min_docs),
            ));
        }
        if let Some(YearFilter::Range { from, to }) = self.year_filter {
            if from > to {
                return Err(Error::validation(
                    "year_filter",
                    format!("range {}-{} is inverted", from, to),
                ));
            }
        }
        if let Some(filter) = self.year_filter {
            if filter.width() > MAX_YEAR_SPAN {
                return Err(Error::validation(
                    "year_filter",
                    format!(
                        "range {} spans {} years, more than {}",
                        filter,
                        filter.width(),
                        MAX_YEAR_SPAN
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Lexical query: tokens of the query text followed by the expansion terms.
    pub fn query_tokens(&self, query_text: &str) -> Vec<String> {
        let mut tokens = tokenize(query_text);
        for term in &self.expanded_terms {
            tokens.extend(tokenize(term));
        }
        tokens
    }
}
