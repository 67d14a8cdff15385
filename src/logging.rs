//! Tracing subscriber setup for the `notegraph` binary.
//!
//! Logs go to stderr so that table and JSON output on stdout stays
//! machine-readable.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins; `level` is the fallback.
pub fn init(level: &str) -> Result<()> {
    let filter = filter_for(level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to set tracing subscriber: {e}"))
}

fn filter_for(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log level '{level}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_parse() {
        for level in ["error", "warn", "info", "debug", "notegraph_core=debug,info"] {
            assert!(EnvFilter::try_new(level).is_ok(), "expected '{level}' to parse");
        }
    }

    #[test]
    fn test_init_twice_reports_error() {
        let _ = init("info");
        assert!(init("info").is_err());
    }
}
