//! Configuration loading for the replay binary.
//!
//! The configuration lives in `targets-config.yaml`. Every section has a
//! default, so an empty file (or no file at all) is a valid configuration.
//!
//! ```yaml
//! targets:
//!   - id: deliveries
//!     type: count
//!     goal: 4
//!   - id: households
//!     type: count
//!     passesIfGroupCount: { gte: 2 }
//! interval: { start: 1696118400000, end: 1698796799999 }
//! update_state: true
//! paths:
//!   state: target-state.json
//!   emissions: emissions.json
//! logging:
//!   level: info
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use targets_types::{FilterInterval, TargetDefinition};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level replay configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayConfig {
    /// Target definitions used when no state file exists yet.
    #[serde(default)]
    pub targets: Vec<TargetDefinition>,

    /// Aggregation window; all time when absent.
    #[serde(default)]
    pub interval: Option<FilterInterval>,

    /// Whether to cache the snapshot in the state for change detection.
    #[serde(default = "default_true")]
    pub update_state: bool,

    /// File locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interval: None,
            update_state: true,
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ReplayConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Input and output file locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    /// Persisted state blob, read at start and written back at the end.
    #[serde(default = "default_state_path")]
    pub state: PathBuf,

    /// JSON array of emission batches.
    #[serde(default = "default_emissions_path")]
    pub emissions: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
            emissions: default_emissions_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
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

fn default_state_path() -> PathBuf {
    PathBuf::from("target-state.json")
}

fn default_emissions_path() -> PathBuf {
    PathBuf::from("emissions.json")
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use targets_types::TargetKind;

    use super::*;

    #[test]
    fn parse_empty_yaml() {
        let config = ReplayConfig::parse("");
        assert!(matches!(config, Ok(ref c) if *c == ReplayConfig::default()));
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
targets:
  - id: deliveries
    type: count
    goal: 4
  - id: immunized
    type: percent
    translation_key: targets.immunized
  - id: households
    passesIfGroupCount:
      gte: 2
interval:
  start: 100
  end: 200
update_state: false
paths:
  state: /tmp/state.json
  emissions: /tmp/emissions.json
logging:
  level: debug
";
        let config = ReplayConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.unwrap_or_default();

        assert_eq!(config.targets.len(), 3);
        assert!(config.targets.iter().any(|t| t.kind == TargetKind::Percent));
        assert!(config.targets.iter().any(|t| t.group_threshold() == Some(2)));
        assert_eq!(config.interval, Some(FilterInterval::new(100, 200)));
        assert!(!config.update_state);
        assert_eq!(config.paths.state, PathBuf::from("/tmp/state.json"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config = ReplayConfig::parse("logging:\n  level: warn\n").unwrap_or_default();
        assert!(config.update_state);
        assert_eq!(config.paths, PathsConfig::default());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let config = ReplayConfig::parse("targets: [unterminated");
        assert!(matches!(config, Err(ConfigError::Yaml { .. })));
    }
}
