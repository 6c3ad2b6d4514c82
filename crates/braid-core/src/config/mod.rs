//! Configuration for the Braid workspace
//!
//! One [`BraidConfig`] carries a section per component. Every field has a default, so
//! a missing file, a missing section or a missing key all fall back to the defaults.
//! Sources are layered in this order: defaults, TOML file, `BRAID_*` environment
//! variables, explicit overrides.
//!
//! Environment variables map onto dotted keys by stripping the prefix and splitting
//! the section name off the first underscore: `BRAID_BRIDGE_MAX_CASCADE_DEPTH=10`
//! sets `bridge.max_cascade_depth`.

mod validation;

pub use validation::{ConfigValidator, ValidationError, ValidationResult};

use crate::errors::BraidError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "BRAID_";

/// Configuration loading and validation failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {message}")]
    Io {
        /// File that failed to load
        path: String,
        /// Underlying I/O error
        message: String,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("failed to parse config: {message}")]
    Parse {
        /// Parser error
        message: String,
    },

    /// An override named a key that does not exist
    #[error("unknown config key '{key}'")]
    UnknownKey {
        /// Dotted key
        key: String,
    },

    /// An override value could not be parsed for its key
    #[error("invalid value '{value}' for config key '{key}'")]
    InvalidValue {
        /// Dotted key
        key: String,
        /// Raw value
        value: String,
    },

    /// The merged configuration failed validation
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

impl From<ConfigError> for BraidError {
    fn from(err: ConfigError) -> Self {
        BraidError::invalid(err.to_string())
    }
}

/// Bridge coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Deferred transactions one emission pass may drain before giving up (default: 100)
    pub max_cascade_depth: usize,
    /// Parent links followed per touched container before the walk is abandoned (default: 256)
    pub max_ancestry_depth: usize,
    /// Records buffered individually per transaction (default: 100_000)
    pub max_records_per_transaction: usize,
    /// Maintain bridge statistics counters (default: true)
    pub collect_stats: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 100,
            max_ancestry_depth: 256,
            max_records_per_transaction: 100_000,
            collect_stats: true,
        }
    }
}

/// Reactive runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Rounds of reaction re-runs per batch before the runtime reports divergence (default: 100)
    pub max_reaction_iterations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_reaction_iterations: 100,
        }
    }
}

/// Document settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Remote operations kept while waiting for missing causal dependencies (default: 10_000)
    pub max_pending_operations: usize,
    /// Commits made during delivery that one delivery pass hands out before stopping (default: 100)
    pub max_commit_cascade: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_pending_operations: 10_000,
            max_commit_cascade: 100,
        }
    }
}

/// Replication coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Inbound updates queued per document (default: 1024)
    pub max_queued_updates: usize,
    /// Forward remote-origin updates to linked replicas as well as local ones (default: false)
    pub forward_remote_updates: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_queued_updates: 1024,
            forward_remote_updates: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BraidConfig {
    /// Bridge coordinator
    pub bridge: BridgeConfig,
    /// Reactive runtime
    pub runtime: RuntimeConfig,
    /// Document
    pub document: DocumentConfig,
    /// Replication coordinator
    pub replication: ReplicationConfig,
}

impl BraidConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Load a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration file, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BRAID_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `BRAID_*` overrides from the given variables
    ///
    /// Variables without the prefix are ignored.
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let lowered = rest.to_lowercase();
            let key = match lowered.split_once('_') {
                Some((section, field)) => format!("{section}.{field}"),
                None => lowered,
            };
            tracing::debug!(key = key.as_str(), "applying config override from environment");
            self.set_from_string(&key, &value)?;
        }
        Ok(())
    }

    /// Set a single value by dotted key
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "bridge.max_cascade_depth" => self.bridge.max_cascade_depth = parse(key, value)?,
            "bridge.max_ancestry_depth" => self.bridge.max_ancestry_depth = parse(key, value)?,
            "bridge.max_records_per_transaction" => {
                self.bridge.max_records_per_transaction = parse(key, value)?;
            }
            "bridge.collect_stats" => self.bridge.collect_stats = parse(key, value)?,
            "runtime.max_reaction_iterations" => {
                self.runtime.max_reaction_iterations = parse(key, value)?;
            }
            "document.max_pending_operations" => {
                self.document.max_pending_operations = parse(key, value)?;
            }
            "document.max_commit_cascade" => {
                self.document.max_commit_cascade = parse(key, value)?;
            }
            "replication.max_queued_updates" => {
                self.replication.max_queued_updates = parse(key, value)?;
            }
            "replication.forward_remote_updates" => {
                self.replication.forward_remote_updates = parse(key, value)?;
            }
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut root = ConfigValidator::new();

        let mut bridge = root.for_field("bridge");
        bridge
            .range("max_cascade_depth", self.bridge.max_cascade_depth as u64, Some(1), None)
            .range("max_ancestry_depth", self.bridge.max_ancestry_depth as u64, Some(1), None)
            .range(
                "max_records_per_transaction",
                self.bridge.max_records_per_transaction as u64,
                Some(1),
                None,
            );
        root.merge(bridge);

        let mut runtime = root.for_field("runtime");
        runtime.range(
            "max_reaction_iterations",
            self.runtime.max_reaction_iterations as u64,
            Some(1),
            None,
        );
        root.merge(runtime);

        let mut document = root.for_field("document");
        document.range(
            "max_commit_cascade",
            self.document.max_commit_cascade as u64,
            Some(1),
            None,
        );
        root.merge(document);

        let mut replication = root.for_field("replication");
        replication.range(
            "max_queued_updates",
            self.replication.max_queued_updates as u64,
            Some(1),
            None,
        );
        root.merge(replication);

        root.result().map_err(ConfigError::from)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = BraidConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.max_cascade_depth, 100);
        assert_eq!(config.runtime.max_reaction_iterations, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BraidConfig::from_toml_str(
            r#"
            [bridge]
            max_cascade_depth = 7

            [replication]
            forward_remote_updates = true
            "#,
        )
        .unwrap();
        assert_eq!(config.bridge.max_cascade_depth, 7);
        assert_eq!(config.bridge.max_ancestry_depth, 256);
        assert!(config.replication.forward_remote_updates);
        assert_eq!(config.document, DocumentConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\nmax_reaction_iterations = 12").unwrap();
        let config = BraidConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.runtime.max_reaction_iterations, 12);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BraidConfig::load_from_file(Path::new("/nonexistent/braid.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BraidConfig::default();
        config
            .merge_with_vars(vec![
                ("BRAID_BRIDGE_MAX_CASCADE_DEPTH".to_string(), "3".to_string()),
                ("BRAID_BRIDGE_COLLECT_STATS".to_string(), "false".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();
        assert_eq!(config.bridge.max_cascade_depth, 3);
        assert!(!config.bridge.collect_stats);
    }

    #[test]
    fn test_unknown_and_invalid_overrides() {
        let mut config = BraidConfig::default();
        assert!(matches!(
            config.set_from_string("bridge.nope", "1"),
            Err(ConfigError::UnknownKey { .. })
        ));
        assert!(matches!(
            config.set_from_string("bridge.max_cascade_depth", "many"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = BraidConfig::default();
        config.bridge.max_cascade_depth = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bridge.max_cascade_depth"));
    }
}
