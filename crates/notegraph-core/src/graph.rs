//! Arena-backed knowledge graph.
//!
//! Nodes are addressed by their [`ChunkStore`] index. Edges live in one
//! `Vec` and the adjacency lists hold `(neighbor, edge index)` pairs in both
//! directions, so derivations can treat the graph as undirected while each
//! [`GraphEdge`] keeps its source → target orientation.
//!
//! The graph is immutable once built. Structure derivation and retrieval
//! only ever see `&KnowledgeGraph`.

use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::config::GraphConfig;
use crate::edges::{discover_edges, Edge, EdgeType};
use crate::error::{Error, Result};
use crate::store::ChunkStore;

/// An edge in arena form: endpoints are node indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    pub edge_type: EdgeType,
    pub weight: f32,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    node_ids: Vec<String>,
    edges: Vec<GraphEdge>,
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl KnowledgeGraph {
    /// Discover edges over the whole store and assemble the graph.
    pub fn from_store(store: &ChunkStore, config: &GraphConfig) -> Result<Self> {
        let edges = discover_edges(store, config);
        Self::build(store, edges)
    }

    /// Assemble a graph from id-addressed edges.
    ///
    /// An edge naming an unknown chunk or a self-loop is an error. A second
    /// edge between the same pair of chunks, in either direction, is dropped.
    pub fn build(store: &ChunkStore, edges: Vec<Edge>) -> Result<Self> {
        let n = store.len();
        let node_ids: Vec<String> = store.chunks().iter().map(|c| c.id.clone()).collect();
        let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
        let mut arena: Vec<GraphEdge> = Vec::with_capacity(edges.len());
        let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(edges.len());

        for edge in edges {
            let (Some(source), Some(target)) =
                (store.index_of(&edge.source), store.index_of(&edge.target))
            else {
                return Err(Error::InvalidEdge {
                    source_id: edge.source,
                    target_id: edge.target,
                    message: "endpoint is not a known chunk".to_string(),
                });
            };
            if source == target {
                return Err(Error::InvalidEdge {
                    source_id: edge.source,
                    target_id: edge.target,
                    message: "self-loop".to_string(),
                });
            }
            if !seen.insert((source.min(target), source.max(target))) {
                warn!(source = %edge.source, target = %edge.target, "dropping duplicate edge");
                continue;
            }

            let idx = arena.len();
            arena.push(GraphEdge {
                source,
                target,
                edge_type: edge.edge_type,
                weight: edge.weight,
            });
            adjacency[source].push((target, idx));
            adjacency[target].push((source, idx));
        }

        for list in &mut adjacency {
            list.sort_unstable();
        }

        Ok(Self {
            node_ids,
            edges: arena,
            adjacency,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_id(&self, index: usize) -> &str {
        &self.node_ids[index]
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Neighbours of `index` in ascending node order, with the connecting edge.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = (usize, &GraphEdge)> + '_ {
        self.adjacency[index]
            .iter()
            .map(move |&(n, e)| (n, &self.edges[e]))
    }

    pub fn degree(&self, index: usize) -> usize {
        self.adjacency[index].len()
    }

    /// Weighted degree: sum of incident edge weights.
    pub fn strength(&self, index: usize) -> f64 {
        self.neighbors(index).map(|(_, e)| e.weight as f64).sum()
    }

    /// Edge counts per type, in [`EdgeType`] order.
    pub fn edge_type_counts(&self) -> BTreeMap<EdgeType, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.edges {
            *counts.entry(e.edge_type).or_insert(0) += 1;
        }
        counts
    }

    /// Edges back in id form, e.g. for persisting.
    pub fn to_edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|e| Edge {
                source: self.node_ids[e.source].clone(),
                target: self.node_ids[e.target].clone(),
                edge_type: e.edge_type,
                weight: e.weight,
            })
            .collect()
    }
}
