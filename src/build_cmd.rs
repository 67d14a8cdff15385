//! `notegraph build`: turn a JSON Lines chunk file into a persisted graph.
//!
//! Each line is a [`ChunkRecord`]. Records without a vector are embedded
//! through the configured provider; with embeddings disabled they are
//! skipped. The finished snapshot replaces whatever the database held.

use anyhow::{Context, Result};
use notegraph_core::engine::{BuildReport, Engine};
use notegraph_core::models::{Chunk, ChunkRecord};
use std::path::Path;
use tracing::warn;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::migrate;
use crate::snapshot_store::{self, SnapshotMeta};

/// Records read from the input, plus lines that could not be parsed.
struct ParsedInput {
    records: Vec<ChunkRecord>,
    malformed: usize,
}

pub async fn run_build(config: &Config, input: &Path) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read chunk file: {}", input.display()))?;
    let parsed = parse_records(&content);

    let provider = embedding::create_provider(&config.embedding)?;
    let (chunks, unembedded) =
        attach_vectors(provider.as_ref(), parsed.records, config.embedding.batch_size).await;

    let (engine, report) = Engine::build(chunks, config.engine.clone())?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let meta = snapshot_store::save(&pool, &engine.snapshot())
        .await
        .context("Failed to save snapshot")?;
    pool.close().await;

    print_report(&report, &meta, parsed.malformed, unembedded);
    Ok(())
}

fn parse_records(content: &str) -> ParsedInput {
    let mut records = Vec::new();
    let mut malformed = 0;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed chunk record");
                malformed += 1;
            }
        }
    }
    ParsedInput { records, malformed }
}

/// Finish records into chunks. Returns the chunks and how many records
/// were dropped for lack of a vector.
async fn attach_vectors(
    provider: &dyn Embedder,
    records: Vec<ChunkRecord>,
    batch_size: usize,
) -> (Vec<Chunk>, usize) {
    let (ready, pending): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| r.vector.is_some());

    let mut chunks: Vec<Chunk> = ready
        .into_iter()
        .map(|mut r| {
            let vector = r.vector.take().unwrap_or_default();
            r.into_chunk(vector)
        })
        .collect();

    if pending.is_empty() {
        return (chunks, 0);
    }
    if !provider.is_enabled() {
        for record in &pending {
            warn!(chunk_id = %record.id, "skipping chunk without vector: embeddings are disabled");
        }
        return (chunks, pending.len());
    }

    let mut dropped = 0;
    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        match provider.embed(&texts).await {
            Ok(vectors) => {
                chunks.extend(
                    batch
                        .iter()
                        .cloned()
                        .zip(vectors)
                        .map(|(record, vector)| record.into_chunk(vector)),
                );
            }
            Err(e) => {
                warn!(
                    error = %e,
                    count = batch.len(),
                    "embedding batch failed, skipping its chunks"
                );
                dropped += batch.len();
            }
        }
    }
    (chunks, dropped)
}

fn print_report(report: &BuildReport, meta: &SnapshotMeta, malformed: usize, unembedded: usize) {
    println!("build");
    println!("  chunks kept: {}", report.kept);
    println!(
        "  chunks skipped: {}",
        report.skipped.len() + malformed + unembedded
    );
    println!("  edges: {}", report.edges);
    for (edge_type, count) in &report.edge_types {
        println!("    {:<18} {}", edge_type.as_str(), count);
    }
    println!("  communities: {}", report.communities);
    println!("  hubs: {}", report.hubs);
    println!("  bridges: {}", report.bridges);
    println!("  build id: {}", meta.build_id);
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;

    #[test]
    fn test_parse_records_skips_bad_lines() {
        let content = r#"
{"id":"a","document_id":"d","text":"alpha","category":"ai","vector":[1.0,0.0]}
not json
{"id":"b","document_id":"d","text":"beta","category":"astrology"}

{"id":"c","document_id":"d","doc_order":2,"text":"gamma","year":2021,"category":"work"}
"#;
        let parsed = parse_records(content);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.malformed, 2);
        assert_eq!(parsed.records[1].year, Some(2021));
    }

    #[tokio::test]
    async fn test_records_without_vectors_skipped_when_disabled() {
        let parsed = parse_records(
            r#"{"id":"a","document_id":"d","text":"rust graphs","category":"ai","vector":[1.0,0.0]}
{"id":"b","document_id":"d","text":"no vector here","category":"ai"}"#,
        );
        let (chunks, dropped) = attach_vectors(&DisabledProvider, parsed.records, 8).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(chunks[0].tokens, vec!["rust".to_string(), "graphs".to_string()]);
    }
}
