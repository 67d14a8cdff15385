//! Read-only chunk store.
//!
//! The store owns every [`Chunk`] of one corpus version. It is built once,
//! never mutated, and shared by reference between the graph builder and any
//! number of concurrent queries.
//!
//! Chunks are kept sorted by id, so a chunk's index doubles as its rank in
//! id order. The graph arena reuses the same indices, and "lowest chunk id"
//! tie-breaks reduce to comparing integers.
//!
//! Construction isolates per-chunk faults: a chunk whose vector has the
//! wrong dimensionality, or whose id was already seen, is excluded and
//! reported rather than failing the whole build.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::embedding::l2_norm;
use crate::error::Error;
use crate::lexical::Bm25Index;
use crate::models::Chunk;

#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    index: HashMap<String, usize>,
    norms: Vec<f32>,
    lexical: Bm25Index,
    dimensions: usize,
}

/// Result of [`ChunkStore::build`]: the store plus the chunks it excluded.
#[derive(Debug)]
pub struct StoreBuild {
    pub store: ChunkStore,
    pub skipped: Vec<Error>,
}

impl ChunkStore {
    /// Build a store, excluding chunks that fail per-chunk validation.
    ///
    /// On duplicate ids the first occurrence wins.
    pub fn build(chunks: Vec<Chunk>, dimensions: usize) -> StoreBuild {
        let mut kept: Vec<Chunk> = Vec::with_capacity(chunks.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(chunks.len());
        let mut skipped = Vec::new();

        for chunk in chunks {
            if chunk.vector.len() != dimensions {
                let err = Error::DimensionMismatch {
                    chunk_id: chunk.id.clone(),
                    expected: dimensions,
                    actual: chunk.vector.len(),
                };
                warn!(
                    chunk_id = %chunk.id,
                    expected = dimensions,
                    actual = chunk.vector.len(),
                    "excluding chunk: dimension mismatch"
                );
                skipped.push(err);
                continue;
            }
            if !seen.insert(chunk.id.clone()) {
                warn!(chunk_id = %chunk.id, "excluding chunk: duplicate id");
                skipped.push(Error::DuplicateChunk { chunk_id: chunk.id });
                continue;
            }
            kept.push(chunk);
        }

        kept.sort_by(|a, b| a.id.cmp(&b.id));

        let index = kept
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        let norms = kept.iter().map(|c| l2_norm(&c.vector)).collect();
        let lexical = Bm25Index::build(kept.iter().map(|c| c.tokens.as_slice()));

        StoreBuild {
            store: Self {
                chunks: kept,
                index,
                norms,
                lexical,
                dimensions,
            },
            skipped,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Chunk at `index`. Panics if out of range, like slice indexing.
    pub fn get(&self, index: usize) -> &Chunk {
        &self.chunks[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn by_id(&self, id: &str) -> Option<&Chunk> {
        self.index_of(id).map(|i| &self.chunks[i])
    }

    /// Precomputed L2 norm of the chunk's vector.
    pub fn norm(&self, index: usize) -> f32 {
        self.norms[index]
    }

    pub fn lexical(&self) -> &Bm25Index {
        &self.lexical
    }

    /// Most recent year present in the corpus.
    pub fn newest_year(&self) -> Option<i32> {
        self.chunks.iter().filter_map(|c| c.year).max()
    }
}
