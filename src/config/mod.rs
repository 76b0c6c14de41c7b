//! Configuration loading and management

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Store root fields dispatch to when they do not name one
pub const DEFAULT_STORE: &str = "default";

/// Bounds used for complexity estimation of list fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityConfig {
    /// Expected minimum number of rows in a list
    #[serde(default = "default_list_low")]
    pub list_low: u64,

    /// Expected maximum number of rows in a list
    #[serde(default = "default_list_high")]
    pub list_high: u64,

    /// Log a warning when a query's upper bound exceeds this value
    #[serde(default)]
    pub warn_above: Option<u64>,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            list_low: default_list_low(),
            list_high: default_list_high(),
            warn_above: None,
        }
    }
}

fn default_list_low() -> u64 {
    1
}

fn default_list_high() -> u64 {
    100
}

fn default_store() -> String {
    DEFAULT_STORE.to_string()
}

/// Complete configuration for the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Store used by root fields without an explicit store
    #[serde(default = "default_store")]
    pub default_store: String,

    #[serde(default)]
    pub complexity: ComplexityConfig,

    /// Maximum selection nesting depth; unlimited when absent
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// `tracing` filter directive, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_store: default_store(),
            complexity: ComplexityConfig::default(),
            max_depth: None,
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}
