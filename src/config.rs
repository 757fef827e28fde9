//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (ARCHIPLAN_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [engine]
//! max_changes_per_plan = 200
//! chunk_threshold = 50
//! settle_delay_ms = 30
//!
//! [idempotency]
//! capacity = 256
//! ttl_secs = 600
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! ARCHIPLAN_ENGINE__CHUNK_THRESHOLD=25
//! ARCHIPLAN_IDEMPOTENCY__TTL_SECS=60
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine execution knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of operations accepted in one plan envelope.
    #[serde(default = "default_max_changes")]
    pub max_changes_per_plan: usize,

    /// Maximum sub-commands per chunk. Splits never cross an operation
    /// boundary; an oversize single operation still forms one chunk.
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: usize,

    /// Sleep between chunk commit and verification, letting the command
    /// stack's internal asynchrony settle.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How many missing ids a `SilentRollback` error reports at most.
    #[serde(default = "default_missing_id_prefix")]
    pub missing_id_report_limit: usize,
}

/// Idempotency registry sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// LRU bound on cached plan results.
    #[serde(default = "default_idem_capacity")]
    pub capacity: usize,

    /// Time-to-live of a cached result, in seconds.
    #[serde(default = "default_idem_ttl")]
    pub ttl_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_changes() -> usize {
    200
}
fn default_chunk_threshold() -> usize {
    50
}
fn default_settle_delay_ms() -> u64 {
    30
}
fn default_missing_id_prefix() -> usize {
    10
}
fn default_idem_capacity() -> usize {
    256
}
fn default_idem_ttl() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (ARCHIPLAN_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("ARCHIPLAN_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ARCHIPLAN_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            idempotency: IdempotencyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_changes_per_plan: default_max_changes(),
            chunk_threshold: default_chunk_threshold(),
            settle_delay_ms: default_settle_delay_ms(),
            missing_id_report_limit: default_missing_id_prefix(),
        }
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        IdempotencyConfig {
            capacity: default_idem_capacity(),
            ttl_secs: default_idem_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.max_changes_per_plan, 200);
        assert_eq!(config.engine.chunk_threshold, 50);
        assert_eq!(config.idempotency.capacity, 256);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).expect("serializable");
        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("[idempotency]"));
        assert!(toml_str.contains("[logging]"));
    }
}
