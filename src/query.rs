//! `notegraph query`: gap-filled retrieval from the command line.
//!
//! Loads the persisted snapshot, builds a [`QueryPlan`] from the flags,
//! embeds the query text (or runs lexical-only when embeddings are
//! disabled), and prints the ranked evidence with its confidence tier.

use anyhow::{Context, Result};
use clap::Args;
use notegraph_core::engine::{Engine, Evidence};
use notegraph_core::models::Category;
use notegraph_core::plan::{Difficulty, QueryPlan, QueryType};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::snapshot_store;

/// Query-plan flags shared by `notegraph query`.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Query type: specific, temporal, synthesis, comparison, exploratory.
    #[arg(long = "type", default_value = "specific")]
    pub query_type: String,

    /// Difficulty: easy, medium, hard.
    #[arg(long, default_value = "medium")]
    pub difficulty: String,

    /// Restrict to one year (widened by the configured year window).
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub year: Option<i32>,

    /// First year of an inclusive range (requires --to).
    #[arg(long, requires = "to")]
    pub from: Option<i32>,

    /// Last year of an inclusive range (requires --from).
    #[arg(long, requires = "from")]
    pub to: Option<i32>,

    /// Only consider chunks of this category.
    #[arg(long)]
    pub category: Option<String>,

    /// A category the answer should draw on. Repeatable.
    #[arg(long = "expect")]
    pub expect: Vec<String>,

    /// Extra lexical query term. Repeatable.
    #[arg(long = "term")]
    pub terms: Vec<String>,

    /// Override the year window around --year.
    #[arg(long)]
    pub window: Option<u32>,
}

impl PlanArgs {
    pub fn to_plan(&self) -> Result<QueryPlan> {
        let query_type: QueryType = self.query_type.parse()?;
        let difficulty: Difficulty = self.difficulty.parse()?;
        let mut plan = QueryPlan::new(query_type, difficulty);

        if let Some(year) = self.year {
            plan = plan.with_year(year);
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            plan = plan.with_year_range(from, to);
        }
        if let Some(category) = &self.category {
            plan = plan.with_category(category.parse::<Category>()?);
        }
        for category in &self.expect {
            plan = plan.expect_category(category.parse::<Category>()?);
        }
        if !self.terms.is_empty() {
            plan = plan.with_terms(self.terms.iter().cloned());
        }
        if let Some(window) = self.window {
            plan = plan.with_year_window(window);
        }

        plan.validate()?;
        Ok(plan)
    }
}

/// Answer-generation payload, as printed by `query --json` and returned
/// by `POST /retrieve`.
#[derive(Debug, Serialize)]
pub struct EvidenceReport<'a> {
    pub query: &'a str,
    pub plan: &'a QueryPlan,
    #[serde(flatten)]
    pub evidence: &'a Evidence,
}

/// Load the stored snapshot into an engine.
pub async fn load_engine(config: &Config) -> Result<Engine> {
    let pool = db::connect(config).await?;
    let (snapshot, meta) = snapshot_store::load(&pool).await?;
    pool.close().await;

    Engine::from_snapshot(snapshot, config.engine.clone())
        .with_context(|| format!("Failed to restore snapshot {}", meta.build_id))
}

pub async fn run_query(config: &Config, query: &str, args: &PlanArgs, json: bool) -> Result<()> {
    let plan = args.to_plan()?;
    let engine = load_engine(config).await?;

    let provider = embedding::create_provider(&config.embedding)?;
    let query_vector = embedding::embed_query(provider.as_ref(), query).await?;

    let evidence = engine.evidence(&plan, query, &query_vector, None)?;
    let report = EvidenceReport {
        query,
        plan: &plan,
        evidence: &evidence,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn print_table(report: &EvidenceReport<'_>) {
    let evidence = report.evidence;
    let result = &evidence.result;

    println!(
        "query: \"{}\" (type={}, difficulty={})",
        report.query, report.plan.query_type, report.plan.difficulty
    );
    if let Some(filter) = report.plan.year_filter {
        println!("year filter: {}", filter);
    }
    println!(
        "tier: {}  rounds: {}  termination: {}",
        evidence.tier, evidence.rounds, evidence.termination
    );
    if result.prefilter_relaxed {
        println!("note: no chunk passed the pre-filter; searched the whole corpus");
    }

    if result.is_empty() {
        println!("No results.");
        return;
    }

    println!();
    println!(
        "{:>3}  {:>8}  {:>5}  {:<10}  {:<24}  TEXT",
        "#", "SCORE", "YEAR", "CATEGORY", "CHUNK"
    );
    for (i, c) in result.candidates.iter().enumerate() {
        let year = c
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if c.breakdown.expanded { "+" } else { " " };
        println!(
            "{:>3}  {:>8.4}  {:>5}  {:<10}  {:<24}{} {}",
            i + 1,
            c.score,
            year,
            c.category.as_str(),
            c.chunk_id,
            marker,
            snippet(&c.text, 60)
        );
    }
    println!();
    println!(
        "{} results ({} year-matched) from {} considered",
        result.len(),
        result.year_matched_count,
        result.total_considered
    );
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::plan::YearFilter;

    fn args() -> PlanArgs {
        PlanArgs {
            query_type: "temporal".to_string(),
            difficulty: "hard".to_string(),
            year: None,
            from: None,
            to: None,
            category: None,
            expect: Vec::new(),
            terms: Vec::new(),
            window: None,
        }
    }

    #[test]
    fn test_plan_from_flags() {
        let plan = PlanArgs {
            from: Some(2019),
            to: Some(2021),
            expect: vec!["work".to_string(), "AI".to_string()],
            terms: vec!["kubernetes".to_string()],
            ..args()
        }
        .to_plan()
        .unwrap();
        assert_eq!(plan.min_docs, 10);
        assert_eq!(plan.max_docs, 15);
        assert_eq!(
            plan.year_filter,
            Some(YearFilter::Range {
                from: 2019,
                to: 2021
            })
        );
        assert_eq!(plan.expected_categories, vec![Category::Work, Category::Ai]);
        assert_eq!(plan.expanded_terms, vec!["kubernetes".to_string()]);
    }

    #[test]
    fn test_bad_flags_rejected() {
        assert!(PlanArgs {
            query_type: "vague".to_string(),
            ..args()
        }
        .to_plan()
        .is_err());
        assert!(PlanArgs {
            category: Some("astrology".to_string()),
            ..args()
        }
        .to_plan()
        .is_err());
        assert!(PlanArgs {
            from: Some(2022),
            to: Some(2020),
            ..args()
        }
        .to_plan()
        .is_err());
    }

    #[test]
    fn test_snippet_truncates_on_chars() {
        assert_eq!(snippet("short  text\nhere", 60), "short text here");
        assert_eq!(snippet("ééééé", 3), "ééé...");
    }
}
