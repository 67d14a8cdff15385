//! # notegraph
//!
//! A personal knowledge graph with hybrid retrieval. Chunks produced by an
//! upstream document pipeline are linked into a typed graph, clustered into
//! communities, and served through gap-filled dense + lexical retrieval
//! that reports how far the evidence can be trusted.
//!
//! All ranking and graph logic lives in [`notegraph_core`]. This crate adds
//! the outer surfaces: configuration, logging, embedding providers, SQLite
//! snapshot persistence, the `notegraph` CLI, and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ chunks.jsonl│──▶│ build + embed│──▶│   SQLite   │
//! └─────────────┘   └──────────────┘   │  snapshot  │
//!                                      └─────┬──────┘
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │ (query)  │         │(retrieve)│
//!                 └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! notegraph init
//! notegraph build ./data/chunks.jsonl
//! notegraph query "what did I learn about kubernetes" --type temporal --from 2019 --to 2021
//! notegraph serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`snapshot_store`] | Snapshot save/load |
//! | [`embedding`] | Embedding providers |
//! | [`build_cmd`] | Corpus build command |
//! | [`query`] | Query command and plan flags |
//! | [`stats`] | Snapshot statistics |
//! | [`server`] | HTTP server |

pub mod build_cmd;
pub mod config;
pub mod db;
pub mod embedding;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod server;
pub mod snapshot_store;
pub mod stats;
