//! Application configuration.
//!
//! Loaded from a TOML file (default `./config/notegraph.toml`). Every
//! section except `[db]` is optional; the `[engine.*]` tables map directly
//! onto [`EngineConfig`] and fall back to its defaults key by key.
//!
//! ```toml
//! [db]
//! path = "./data/notegraph.sqlite"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [engine.graph]
//! dimensions = 768
//!
//! [engine.retrieval]
//! graph_expansion = true
//! ```

use anyhow::{Context, Result};
use notegraph_core::config::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Per-request deadline for `POST /retrieve`, checked at gap-fill
    /// round boundaries.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_query_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    config
        .engine
        .validate()
        .with_context(|| "Invalid [engine] configuration")?;

    if config.server.query_timeout_ms == 0 {
        anyhow::bail!("server.query_timeout_ms must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        let Some(dims) = config.embedding.dims.filter(|d| *d > 0) else {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        };
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if dims != config.engine.graph.dimensions {
            anyhow::bail!(
                "embedding.dims ({}) must equal engine.graph.dimensions ({})",
                dims,
                config.engine.graph.dimensions
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/ng.sqlite\"\n").unwrap();
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.server.query_timeout_ms, 2000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_engine_tables_override_single_keys() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[engine.graph]
dimensions = 4

[engine.retrieval]
graph_expansion = true
"#,
        )
        .unwrap();
        assert_eq!(config.engine.graph.dimensions, 4);
        assert!(config.engine.retrieval.graph_expansion);
        assert_eq!(config.engine.retrieval.rrf_k, 60.0);
    }

    #[test]
    fn test_embedding_dims_must_match_engine() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("engine.graph.dimensions"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_invalid_engine_section_rejected() {
        let result = parse("[db]\npath = \"x\"\n[engine.gap_fill]\nmax_rounds = 0\n");
        assert!(result.is_err());
    }
}
