//! Engine facade.
//!
//! [`Engine`] owns one immutable corpus version: the chunk store, the
//! knowledge graph, its derived structure and the configuration. It is
//! `Send + Sync` and needs no locking; the application shares it behind an
//! `Arc` between concurrent queries.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

use crate::confidence::{classify, ConfidenceTier};
use crate::config::EngineConfig;
use crate::edges::EdgeType;
use crate::error::{Error, Result};
use crate::gapfill::{Gap, GapFillController, GapFillTermination};
use crate::graph::KnowledgeGraph;
use crate::models::{Category, Chunk};
use crate::plan::QueryPlan;
use crate::retrieval::{HybridRetriever, RetrievalResult};
use crate::snapshot::GraphSnapshot;
use crate::store::{ChunkStore, StoreBuild};
use crate::structure::{GraphStructure, StructureExtractor};

/// What a build kept, skipped and derived.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub kept: usize,
    /// Chunks excluded by per-chunk validation.
    pub skipped: Vec<Error>,
    pub edge_types: BTreeMap<EdgeType, usize>,
    pub edges: usize,
    pub communities: usize,
    pub hubs: usize,
    pub bridges: usize,
}

/// Ranked evidence for answer generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub result: RetrievalResult,
    pub tier: ConfidenceTier,
    pub rounds: usize,
    pub termination: GapFillTermination,
    pub open_gaps: Vec<Gap>,
}

#[derive(Debug)]
pub struct Engine {
    store: ChunkStore,
    graph: KnowledgeGraph,
    structure: GraphStructure,
    config: EngineConfig,
}

impl Engine {
    /// Build store, graph and structure from raw chunks.
    pub fn build(chunks: Vec<Chunk>, config: EngineConfig) -> Result<(Self, BuildReport)> {
        config.validate()?;

        let StoreBuild { store, skipped } = ChunkStore::build(chunks, config.graph.dimensions);
        let graph = KnowledgeGraph::from_store(&store, &config.graph)?;
        let categories: Vec<Category> = store.chunks().iter().map(|c| c.category).collect();
        let structure =
            StructureExtractor::new(config.structure.clone()).extract(&graph, &categories);

        let report = BuildReport {
            kept: store.len(),
            skipped,
            edge_types: graph.edge_type_counts(),
            edges: graph.edge_count(),
            communities: structure.community_count(),
            hubs: structure.hubs().len(),
            bridges: structure.bridges().len(),
        };
        info!(
            kept = report.kept,
            skipped = report.skipped.len(),
            edges = report.edges,
            communities = report.communities,
            hubs = report.hubs,
            bridges = report.bridges,
            "graph built"
        );

        Ok((
            Self {
                store,
                graph,
                structure,
                config,
            },
            report,
        ))
    }

    /// Assemble an engine from already-built parts.
    pub fn new(
        store: ChunkStore,
        graph: KnowledgeGraph,
        structure: GraphStructure,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if graph.node_count() != store.len() || structure.node_count() != store.len() {
            return Err(Error::Snapshot {
                message: format!(
                    "store has {} chunks but graph has {} nodes and structure {}",
                    store.len(),
                    graph.node_count(),
                    structure.node_count()
                ),
            });
        }
        if store.dimensions() != config.graph.dimensions {
            return Err(Error::Config {
                message: format!(
                    "snapshot vectors have {} dimensions, config expects {}",
                    store.dimensions(),
                    config.graph.dimensions
                ),
            });
        }
        Ok(Self {
            store,
            graph,
            structure,
            config,
        })
    }

    pub fn from_snapshot(snapshot: GraphSnapshot, config: EngineConfig) -> Result<Self> {
        let (store, graph, structure) = snapshot.restore()?;
        Self::new(store, graph, structure, config)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.store, &self.graph, &self.structure)
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn structure(&self) -> &GraphStructure {
        &self.structure
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn retriever(&self) -> HybridRetriever<'_> {
        HybridRetriever::new(&self.store, &self.config.retrieval)
            .with_graph(&self.graph, &self.structure)
    }

    /// Gap-filled retrieval plus confidence tier for one query.
    ///
    /// `query_vector` may be empty for lexical-only retrieval. Only a
    /// malformed plan or query vector is an error.
    pub fn evidence(
        &self,
        plan: &QueryPlan,
        query_text: &str,
        query_vector: &[f32],
        deadline: Option<Instant>,
    ) -> Result<Evidence> {
        let tokens = plan.query_tokens(query_text);
        let outcome = GapFillController::new(self.retriever(), &self.config.gap_fill).run(
            plan,
            query_vector,
            &tokens,
            deadline,
        )?;
        let tier = classify(&outcome.result, plan);
        info!(
            tier = %tier,
            rounds = outcome.rounds,
            termination = %outcome.termination,
            returned = outcome.result.len(),
            "evidence ready"
        );
        Ok(Evidence {
            result: outcome.result,
            tier,
            rounds: outcome.rounds,
            termination: outcome.termination,
            open_gaps: outcome.open_gaps,
        })
    }
}
