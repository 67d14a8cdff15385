//! Persistable graph snapshot.
//!
//! A [`GraphSnapshot`] is the flat, table-shaped form of a built graph:
//! chunk rows, edge rows and per-node structure rows. The application
//! writes it to SQLite after a build and reads it back at startup.
//!
//! [`GraphSnapshot::restore`] is strict. Unlike a fresh build, which skips
//! bad chunks, any inconsistency in a snapshot (a dangling edge, a missing
//! node row, a fingerprint that no longer matches) is fatal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::edges::Edge;
use crate::error::{Error, Result};
use crate::graph::KnowledgeGraph;
use crate::models::Chunk;
use crate::store::ChunkStore;
use crate::structure::GraphStructure;

/// Structure values for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub chunk_id: String,
    /// `None` when the graph was too small to have communities.
    pub community: Option<usize>,
    pub is_hub: bool,
    pub is_bridge: bool,
    pub degree: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    pub chunks: Vec<Chunk>,
    pub edges: Vec<Edge>,
    pub nodes: Vec<NodeRecord>,
    pub dimensions: usize,
    pub corpus_fingerprint: String,
}

/// SHA-256 over chunk ids and texts in id order, hex-encoded.
pub fn corpus_fingerprint(chunks: &[Chunk]) -> String {
    let mut sorted: Vec<&Chunk> = chunks.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = Sha256::new();
    for chunk in sorted {
        hasher.update(chunk.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

impl GraphSnapshot {
    pub fn capture(store: &ChunkStore, graph: &KnowledgeGraph, structure: &GraphStructure) -> Self {
        let nodes = store
            .chunks()
            .iter()
            .enumerate()
            .map(|(i, c)| NodeRecord {
                chunk_id: c.id.clone(),
                community: structure.community_of(i),
                is_hub: structure.is_hub(i),
                is_bridge: structure.is_bridge(i),
                degree: graph.degree(i),
            })
            .collect();

        Self {
            chunks: store.chunks().to_vec(),
            edges: graph.to_edges(),
            nodes,
            dimensions: store.dimensions(),
            corpus_fingerprint: corpus_fingerprint(store.chunks()),
        }
    }

    /// Rebuild the in-memory store, graph and structure.
    pub fn restore(self) -> Result<(ChunkStore, KnowledgeGraph, GraphStructure)> {
        let fingerprint = corpus_fingerprint(&self.chunks);
        if fingerprint != self.corpus_fingerprint {
            return Err(snapshot_error(
                "corpus fingerprint does not match the stored chunks",
            ));
        }

        let chunk_count = self.chunks.len();
        let build = ChunkStore::build(self.chunks, self.dimensions);
        if let Some(err) = build.skipped.first() {
            return Err(snapshot_error(format!("invalid chunk row: {}", err)));
        }
        let store = build.store;
        debug_assert_eq!(store.len(), chunk_count);

        let edge_count = self.edges.len();
        let graph = KnowledgeGraph::build(&store, self.edges)
            .map_err(|e| snapshot_error(e.to_string()))?;
        if graph.edge_count() != edge_count {
            return Err(snapshot_error("duplicate edge rows"));
        }

        if self.nodes.len() != store.len() {
            return Err(snapshot_error(format!(
                "{} node rows for {} chunks",
                self.nodes.len(),
                store.len()
            )));
        }
        let mut by_index: HashMap<usize, NodeRecord> = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            let Some(index) = store.index_of(&node.chunk_id) else {
                return Err(snapshot_error(format!(
                    "node row for unknown chunk {}",
                    node.chunk_id
                )));
            };
            if by_index.insert(index, node).is_some() {
                return Err(snapshot_error("duplicate node rows"));
            }
        }

        let mut communities = Vec::with_capacity(store.len());
        let mut hub_flags = Vec::with_capacity(store.len());
        let mut bridge_flags = Vec::with_capacity(store.len());
        for i in 0..store.len() {
            let node = by_index
                .remove(&i)
                .ok_or_else(|| snapshot_error("missing node row"))?;
            if let Some(c) = node.community {
                communities.push(c);
            }
            hub_flags.push(node.is_hub);
            bridge_flags.push(node.is_bridge);
        }
        let structure = GraphStructure::from_parts(communities, hub_flags, bridge_flags)?;

        Ok((store, graph, structure))
    }
}

fn snapshot_error(message: impl Into<String>) -> Error {
    Error::Snapshot {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::edges::EdgeType;
    use crate::models::Category;
    use crate::structure::StructureExtractor;

    fn make_chunk(id: &str, category: Category, vector: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            doc_order: 0,
            text: format!("text {}", id),
            year: Some(2021),
            category,
            vector,
            tokens: vec!["text".to_string()],
            trust: None,
        }
    }

    fn capture() -> GraphSnapshot {
        let store = ChunkStore::build(
            vec![
                make_chunk("a", Category::Ai, vec![1.0, 0.0]),
                make_chunk("b", Category::Ai, vec![0.9, 0.1]),
                make_chunk("c", Category::Work, vec![0.8, 0.3]),
            ],
            2,
        )
        .store;
        let config = EngineConfig::default();
        let graph = KnowledgeGraph::from_store(&store, &config.graph).unwrap();
        let categories: Vec<Category> = store.chunks().iter().map(|c| c.category).collect();
        let structure = StructureExtractor::new(config.structure).extract(&graph, &categories);
        GraphSnapshot::capture(&store, &graph, &structure)
    }

    #[test]
    fn test_capture_and_restore() {
        let snapshot = capture();
        assert_eq!(snapshot.nodes.len(), 3);
        assert!(!snapshot.edges.is_empty());
        let edges = snapshot.edges.clone();
        let nodes = snapshot.nodes.clone();

        let (store, graph, structure) = snapshot.restore().unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(graph.to_edges(), edges);
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(structure.community_of(i), node.community);
            assert_eq!(structure.is_hub(i), node.is_hub);
        }
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = make_chunk("a", Category::Ai, vec![1.0]);
        let b = make_chunk("b", Category::Ai, vec![1.0]);
        assert_eq!(
            corpus_fingerprint(&[a.clone(), b.clone()]),
            corpus_fingerprint(&[b, a.clone()])
        );
        assert_eq!(corpus_fingerprint(&[a]).len(), 64);
    }

    #[test]
    fn test_dangling_edge_is_fatal() {
        let mut snapshot = capture();
        snapshot.edges.push(Edge {
            source: "a".to_string(),
            target: "ghost".to_string(),
            edge_type: EdgeType::SameTopic,
            weight: 0.5,
        });
        assert!(matches!(snapshot.restore(), Err(Error::Snapshot { .. })));
    }

    #[test]
    fn test_tampered_text_is_fatal() {
        let mut snapshot = capture();
        snapshot.chunks[0].text = "edited".to_string();
        assert!(matches!(snapshot.restore(), Err(Error::Snapshot { .. })));
    }

    #[test]
    fn test_missing_node_row_is_fatal() {
        let mut snapshot = capture();
        snapshot.nodes.pop();
        assert!(snapshot.restore().is_err());
    }
}
