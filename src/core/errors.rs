//! Error types for the consensus review engine.
//!
//! Only configuration and policy failures (§7) are typed errors that
//! propagate to callers. Everything else — malformed findings, a missing
//! source file during validation, an unreachable embedding backend — is
//! recovered locally and never surfaces here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the engine's public entry points.
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Errors that can propagate out of the engine.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// I/O failure reading or writing a file the engine owns.
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable description.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// JSON or YAML (de)serialization failure.
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable description.
        message: String,
        /// Underlying error, if one is available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The reviewers root directory does not exist or is not a directory.
    #[error("reviewers directory not found: {path}")]
    MissingReviewersDir {
        /// Path that was probed.
        path: PathBuf,
    },

    /// A reviewer's `PROMPT.md` is missing.
    #[error("missing PROMPT.md for reviewer '{reviewer_id}' at {path}")]
    MissingPrompt {
        /// Reviewer id that was being loaded.
        reviewer_id: String,
        /// Path that was probed.
        path: PathBuf,
    },

    /// A reviewer id outside the fixed five-id set was requested.
    #[error("unknown reviewer id: {reviewer_id}")]
    UnknownReviewer {
        /// The offending id.
        reviewer_id: String,
    },

    /// `create_bypass` was called with an empty reason.
    #[error("bypass reason must not be empty")]
    EmptyBypassReason,

    /// An output path failed `_validate_output_path`.
    #[error("unsafe output path: {path} ({reason})")]
    UnsafeOutputPath {
        /// The rejected path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// Catch-all for conditions that should be unreachable in practice.
    #[error("internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl ReviewError {
    /// Build an [`ReviewError::Io`] with context.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Build an [`ReviewError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<io::Error> for ReviewError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for ReviewError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_distinguishable() {
        let err = ReviewError::UnknownReviewer {
            reviewer_id: "style".into(),
        };
        assert!(matches!(err, ReviewError::UnknownReviewer { .. }));
    }

    #[test]
    fn empty_bypass_reason_has_no_payload() {
        let err = ReviewError::EmptyBypassReason;
        assert_eq!(err.to_string(), "bypass reason must not be empty");
    }
}
