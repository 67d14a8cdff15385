//! Snapshot statistics.
//!
//! Summarizes the stored graph without restoring it: build provenance,
//! chunk and edge counts, edges per type, and structure counts. Used by
//! `notegraph stats` to confirm a build landed.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::snapshot_store;

/// Structure counts read from the `nodes` table.
struct StructureCounts {
    communities: i64,
    hubs: i64,
    bridges: i64,
    isolated: i64,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("notegraph — Snapshot Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));

    let Some(meta) = snapshot_store::load_meta(&pool).await? else {
        println!();
        println!("  No snapshot built yet. Run `notegraph build <chunks.jsonl>`.");
        pool.close().await;
        return Ok(());
    };

    println!();
    println!("  Build:       {}", meta.build_id);
    println!("  Built:       {}", format_built_at(&meta.built_at));
    println!("  Fingerprint: {}", short_fingerprint(&meta.corpus_fingerprint));
    println!("  Dimensions:  {}", meta.dimensions);
    println!();
    println!("  Chunks:      {}", meta.chunk_count);
    println!("  Edges:       {}", meta.edge_count);

    let type_rows = edge_type_counts(&pool).await?;
    if !type_rows.is_empty() {
        println!();
        println!("  By edge type:");
        println!("  {:<20} {:>8}", "TYPE", "EDGES");
        println!("  {}", "-".repeat(29));
        for (edge_type, count) in &type_rows {
            println!("  {:<20} {:>8}", edge_type, count);
        }
    }

    let structure = structure_counts(&pool).await?;
    println!();
    println!("  Communities: {}", structure.communities);
    println!("  Hubs:        {}", structure.hubs);
    println!("  Bridges:     {}", structure.bridges);
    println!("  Isolated:    {}", structure.isolated);
    println!();

    pool.close().await;
    Ok(())
}

async fn edge_type_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT edge_type, COUNT(*) AS n FROM edges GROUP BY edge_type ORDER BY n DESC, edge_type",
    )
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| -> Result<(String, i64)> {
            Ok((row.try_get("edge_type")?, row.try_get("n")?))
        })
        .collect()
}

async fn structure_counts(pool: &SqlitePool) -> Result<StructureCounts> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(DISTINCT community) AS communities,
            COALESCE(SUM(is_hub), 0) AS hubs,
            COALESCE(SUM(is_bridge), 0) AS bridges,
            COALESCE(SUM(CASE WHEN degree = 0 THEN 1 ELSE 0 END), 0) AS isolated
        FROM nodes
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(StructureCounts {
        communities: row.try_get("communities")?,
        hubs: row.try_get("hubs")?,
        bridges: row.try_get("bridges")?,
        isolated: row.try_get("isolated")?,
    })
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// RFC 3339 timestamp as `YYYY-MM-DD HH:MM (n days ago)`.
fn format_built_at(built_at: &str) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(built_at) else {
        return built_at.to_string();
    };
    let parsed = parsed.with_timezone(&Utc);
    let delta = (Utc::now() - parsed).num_seconds();

    let relative = if delta < 0 {
        return parsed.format("%Y-%m-%d %H:%M").to_string();
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    };
    format!("{} ({})", parsed.format("%Y-%m-%d %H:%M"), relative)
}

fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..16).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_built_at() {
        let rendered = format_built_at("2024-03-01T10:15:00+00:00");
        assert!(rendered.starts_with("2024-03-01 10:15 ("), "got {}", rendered);
        assert_eq!(format_built_at("yesterday"), "yesterday");
    }

    #[test]
    fn test_short_fingerprint() {
        assert_eq!(short_fingerprint("abc"), "abc");
        assert_eq!(short_fingerprint(&"f".repeat(64)).len(), 16);
    }
}
