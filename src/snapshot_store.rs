//! SQLite persistence for graph snapshots.
//!
//! A snapshot is written as four tables (`chunks`, `edges`, `nodes`,
//! `snapshot_meta`) and always replaced as a whole inside one transaction.
//! Reading it back yields a [`GraphSnapshot`]; the core's
//! [`GraphSnapshot::restore`] then re-validates every row.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use notegraph_core::edges::{Edge, EdgeType};
use notegraph_core::embedding::{blob_to_vec, vec_to_blob};
use notegraph_core::models::{Category, Chunk};
use notegraph_core::snapshot::{GraphSnapshot, NodeRecord};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

/// Provenance stored next to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMeta {
    pub build_id: String,
    /// RFC 3339 timestamp.
    pub built_at: String,
    pub corpus_fingerprint: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub edge_count: usize,
}

/// Replace the stored snapshot with `snapshot`.
pub async fn save(pool: &SqlitePool, snapshot: &GraphSnapshot) -> Result<SnapshotMeta> {
    let meta = SnapshotMeta {
        build_id: Uuid::new_v4().to_string(),
        built_at: Utc::now().to_rfc3339(),
        corpus_fingerprint: snapshot.corpus_fingerprint.clone(),
        dimensions: snapshot.dimensions,
        chunk_count: snapshot.chunks.len(),
        edge_count: snapshot.edges.len(),
    };

    let mut tx = pool.begin().await?;

    for table in ["chunks", "edges", "nodes", "snapshot_meta"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }

    for chunk in &snapshot.chunks {
        let tokens = serde_json::to_string(&chunk.tokens)?;
        sqlx::query(
            "INSERT INTO chunks
                (id, document_id, doc_order, text, year, category, vector, tokens, trust)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.doc_order as i64)
        .bind(&chunk.text)
        .bind(chunk.year)
        .bind(chunk.category.as_str())
        .bind(vec_to_blob(&chunk.vector))
        .bind(tokens)
        .bind(chunk.trust.map(f64::from))
        .execute(&mut *tx)
        .await?;
    }

    for edge in &snapshot.edges {
        sqlx::query(
            "INSERT INTO edges (source_id, target_id, edge_type, weight) VALUES (?, ?, ?, ?)",
        )
        .bind(&edge.source)
        .bind(&edge.target)
        .bind(edge.edge_type.as_str())
        .bind(f64::from(edge.weight))
        .execute(&mut *tx)
        .await?;
    }

    for node in &snapshot.nodes {
        sqlx::query(
            "INSERT INTO nodes (chunk_id, community, is_hub, is_bridge, degree)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&node.chunk_id)
        .bind(node.community.map(|c| c as i64))
        .bind(node.is_hub)
        .bind(node.is_bridge)
        .bind(node.degree as i64)
        .execute(&mut *tx)
        .await?;
    }

    let rows = [
        ("build_id", meta.build_id.clone()),
        ("built_at", meta.built_at.clone()),
        ("corpus_fingerprint", meta.corpus_fingerprint.clone()),
        ("dimensions", meta.dimensions.to_string()),
        ("chunk_count", meta.chunk_count.to_string()),
        ("edge_count", meta.edge_count.to_string()),
    ];
    for (key, value) in rows {
        sqlx::query("INSERT INTO snapshot_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(meta)
}

/// Snapshot metadata, or `None` if nothing has been built yet.
pub async fn load_meta(pool: &SqlitePool) -> Result<Option<SnapshotMeta>> {
    let rows = sqlx::query("SELECT key, value FROM snapshot_meta")
        .fetch_all(pool)
        .await
        .context("Failed to read snapshot_meta (did you run `notegraph init`?)")?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut values: HashMap<String, String> = HashMap::with_capacity(rows.len());
    for row in rows {
        values.insert(row.try_get("key")?, row.try_get("value")?);
    }

    let text = |key: &str| -> Result<String> {
        values
            .get(key)
            .cloned()
            .with_context(|| format!("snapshot_meta is missing '{}'", key))
    };
    let count = |key: &str| -> Result<usize> {
        text(key)?
            .parse()
            .with_context(|| format!("snapshot_meta '{}' is not a number", key))
    };

    Ok(Some(SnapshotMeta {
        build_id: text("build_id")?,
        built_at: text("built_at")?,
        corpus_fingerprint: text("corpus_fingerprint")?,
        dimensions: count("dimensions")?,
        chunk_count: count("chunk_count")?,
        edge_count: count("edge_count")?,
    }))
}

/// Read the stored snapshot. Unknown categories or edge types are fatal.
pub async fn load(pool: &SqlitePool) -> Result<(GraphSnapshot, SnapshotMeta)> {
    let Some(meta) = load_meta(pool).await? else {
        bail!("No snapshot found. Run `notegraph build <chunks.jsonl>` first.");
    };

    let chunk_rows = sqlx::query(
        "SELECT id, document_id, doc_order, text, year, category, vector, tokens, trust
         FROM chunks ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut chunks = Vec::with_capacity(chunk_rows.len());
    for row in &chunk_rows {
        let id: String = row.try_get("id")?;
        let category: String = row.try_get("category")?;
        let category: Category = category
            .parse()
            .with_context(|| format!("chunk {} has an invalid category", id))?;
        let tokens: String = row.try_get("tokens")?;
        let tokens: Vec<String> = serde_json::from_str(&tokens)
            .with_context(|| format!("chunk {} has malformed tokens", id))?;
        let vector: Vec<u8> = row.try_get("vector")?;
        let doc_order: i64 = row.try_get("doc_order")?;
        let trust: Option<f64> = row.try_get("trust")?;

        chunks.push(Chunk {
            document_id: row.try_get("document_id")?,
            doc_order: u32::try_from(doc_order)
                .with_context(|| format!("chunk {} has an invalid doc_order", id))?,
            text: row.try_get("text")?,
            year: row.try_get("year")?,
            category,
            vector: blob_to_vec(&vector),
            tokens,
            trust: trust.map(|t| t as f32),
            id,
        });
    }

    let edge_rows = sqlx::query(
        "SELECT source_id, target_id, edge_type, weight FROM edges ORDER BY source_id, target_id",
    )
    .fetch_all(pool)
    .await?;

    let mut edges = Vec::with_capacity(edge_rows.len());
    for row in &edge_rows {
        let edge_type: String = row.try_get("edge_type")?;
        let edge_type: EdgeType = edge_type.parse()?;
        let weight: f64 = row.try_get("weight")?;
        edges.push(Edge {
            source: row.try_get("source_id")?,
            target: row.try_get("target_id")?,
            edge_type,
            weight: weight as f32,
        });
    }

    let node_rows = sqlx::query(
        "SELECT chunk_id, community, is_hub, is_bridge, degree FROM nodes ORDER BY chunk_id",
    )
    .fetch_all(pool)
    .await?;

    let mut nodes = Vec::with_capacity(node_rows.len());
    for row in &node_rows {
        let community: Option<i64> = row.try_get("community")?;
        let degree: i64 = row.try_get("degree")?;
        nodes.push(NodeRecord {
            chunk_id: row.try_get("chunk_id")?,
            community: community.map(|c| c as usize),
            is_hub: row.try_get("is_hub")?,
            is_bridge: row.try_get("is_bridge")?,
            degree: degree as usize,
        });
    }

    let snapshot = GraphSnapshot {
        chunks,
        edges,
        nodes,
        dimensions: meta.dimensions,
        corpus_fingerprint: meta.corpus_fingerprint.clone(),
    };
    Ok((snapshot, meta))
}
