//! Error types for the replay binary.

use std::path::PathBuf;

/// Top-level error for the replay binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// A data file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A data file did not contain the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The state engine rejected an operation.
    #[error("state error: {source}")]
    State {
        /// The underlying engine error.
        #[from]
        source: targets_state::TargetStateError,
    },
}
