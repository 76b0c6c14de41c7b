//! Tracing subscriber setup

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

const DEFAULT_FILTER: &str = "info";

/// Filter directive in effect: `RUST_LOG`, then the config, then `info`
pub fn filter_directive(config: &EngineConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install a fmt subscriber for the process
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init_tracing(config: &EngineConfig) -> Result<bool> {
    let directive = filter_directive(config);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("could not parse log filter '{}'", directive))?;

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = EngineConfig {
            log_filter: Some("linqgraph=loudest".to_string()),
            ..EngineConfig::default()
        };
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_second_init_is_harmless() {
        let config = EngineConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config).unwrap_or(false));
    }
}
