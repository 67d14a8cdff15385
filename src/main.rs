//! # notegraph CLI
//!
//! ## Usage
//!
//! ```bash
//! notegraph --config ./config/notegraph.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notegraph init` | Create the SQLite database and snapshot tables |
//! | `notegraph build <chunks.jsonl>` | Build the graph and persist the snapshot |
//! | `notegraph query "<text>"` | Gap-filled retrieval with a confidence tier |
//! | `notegraph stats` | Snapshot metadata and edge counts |
//! | `notegraph serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! notegraph build ./data/chunks.jsonl
//!
//! # Exact year, widened by the configured window
//! notegraph query "side projects" --type specific --year 2020
//!
//! # Year range, expecting work and learning notes
//! notegraph query "career change" --type synthesis --from 2018 --to 2022 \
//!     --expect work --expect learning --json
//! ```

use clap::{Parser, Subcommand};
use notegraph::query::PlanArgs;
use notegraph::{build_cmd, config, logging, migrate, query, server, stats};
use std::path::PathBuf;

/// notegraph: a personal knowledge graph with hybrid retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "notegraph",
    about = "notegraph — a personal knowledge graph with hybrid retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/notegraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Build the knowledge graph from a JSON Lines chunk file.
    ///
    /// Replaces any previously stored snapshot.
    Build {
        /// Path to the chunk file (one JSON record per line).
        input: PathBuf,
    },

    /// Retrieve ranked evidence for a query.
    Query {
        /// The query text.
        query: String,

        #[command(flatten)]
        plan: PlanArgs,

        /// Print the evidence payload as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show snapshot statistics.
    Stats,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `/health` and `/retrieve`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Build { input } => {
            build_cmd::run_build(&cfg, &input).await?;
        }
        Commands::Query {
            query: text,
            plan,
            json,
        } => {
            query::run_query(&cfg, &text, &plan, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
