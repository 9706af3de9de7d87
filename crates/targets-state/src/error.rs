//! Error types for the `targets-state` crate.
//!
//! Referentially broken emissions and stale state shapes are not errors;
//! they are dropped or migrated. Only a malformed call is rejected.

/// Errors returned by the state engine.
#[derive(Debug, thiserror::Error)]
pub enum TargetStateError {
    /// An argument had the wrong shape. State is untouched.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: String,
    },

    /// The state could not be serialized.
    #[error("state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
