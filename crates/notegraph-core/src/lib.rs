//! # notegraph core
//!
//! Pure, synchronous logic for notegraph: the chunk data model, typed
//! relationship discovery, the knowledge graph and its derived structure
//! (communities, hubs, bridges), hybrid dense + lexical retrieval, bounded
//! gap-filling, and the confidence tiers handed to answer generation.
//!
//! This crate contains no tokio, sqlx, network or filesystem I/O. The
//! application crate is responsible for loading chunk records, computing
//! embeddings, persisting snapshots, and exposing the engine over a CLI
//! and HTTP.
//!
//! ## Pipeline
//!
//! ```text
//!   build time                                query time
//! ┌────────────┐   ┌───────────┐          ┌───────────┐   ┌──────────┐
//! │ ChunkStore │──▶│   edges   │          │ QueryPlan │──▶│ gapfill  │◀─┐
//! └────────────┘   └─────┬─────┘          └───────────┘   └────┬─────┘  │
//!                        ▼                                     ▼        │
//!                  ┌───────────┐   ┌───────────┐         ┌───────────┐  │
//!                  │   graph   │──▶│ structure │ ──────▶ │ retrieval │──┘
//!                  └───────────┘   └───────────┘         └─────┬─────┘
//!                                                              ▼
//!                                                        ┌────────────┐
//!                                                        │ confidence │
//!                                                        └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Chunk records and the fixed category set |
//! | [`store`] | Read-only chunk store with lexical statistics |
//! | [`lexical`] | Tokenizer and BM25 scoring |
//! | [`embedding`] | Embedding provider trait and vector helpers |
//! | [`edges`] | Pairwise typed edge classification |
//! | [`graph`] | Arena-backed knowledge graph |
//! | [`structure`] | Communities, hubs, bridges |
//! | [`plan`] | Query plans and document bounds |
//! | [`retrieval`] | Hybrid retrieval with rank fusion and boosts |
//! | [`gapfill`] | Bounded gap-filling state machine |
//! | [`confidence`] | Confidence tier decision table |
//! | [`engine`] | Facade tying the pieces together |
//! | [`snapshot`] | Persistable graph snapshot |

pub mod confidence;
pub mod config;
pub mod edges;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod gapfill;
pub mod graph;
pub mod lexical;
pub mod models;
pub mod plan;
pub mod retrieval;
pub mod snapshot;
pub mod store;
pub mod structure;

pub use error::{Error, Result};
