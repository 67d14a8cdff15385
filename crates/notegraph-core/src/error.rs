//! Error taxonomy for the core.
//!
//! Only conditions a caller must act on are errors. An empty corpus and an
//! exhausted gap-filling budget are ordinary outcomes and are reported
//! through return values instead.

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A query plan (or a value parsed into one) is malformed.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },
    /// A chunk's embedding does not have the configured dimensionality.
    #[error("Chunk {chunk_id} has a {actual}-dimensional vector, expected {expected}.")]
    DimensionMismatch { chunk_id: String, expected: usize, actual: usize },
    #[error("Duplicate chunk id {chunk_id}.")]
    DuplicateChunk { chunk_id: String },
    #[error("Invalid edge {source_id} -> {target_id}: {message}")]
    InvalidEdge { source_id: String, target_id: String, message: String },
    #[error("Invalid engine configuration: {message}")]
    Config { message: String },
    /// The persisted snapshot cannot be turned back into a graph.
    #[error("Corrupt snapshot: {message}")]
    Snapshot { message: String },
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Whether the error is scoped to a single chunk and can be skipped at build time.
    pub fn is_chunk_local(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::DuplicateChunk { .. })
    }
}
