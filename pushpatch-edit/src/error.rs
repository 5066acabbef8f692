//! Error types for pushpatch-edit.
//!
//! This module distinguishes between:
//! - Artifact blocks (exit code 2): an artifact cannot be parsed, or the project lacks a target
//! - Runtime errors (exit code 1): I/O errors and other tool failures

use camino::Utf8PathBuf;
use thiserror::Error;

/// The top-level error type for pushpatch-edit operations.
#[derive(Debug, Error)]
pub enum PatchError {
    /// An artifact cannot be parsed into its structured form.
    #[error("malformed artifact {path}: {message}")]
    MalformedArtifact {
        path: Utf8PathBuf,
        message: String,
    },

    /// Neither target-resolution strategy yields a usable target id.
    #[error("missing target: {message}")]
    MissingTarget {
        message: String,
    },

    /// A runtime/tool error occurred (exit code 1).
    #[error("runtime error: {0:#}")]
    Runtime(#[from] anyhow::Error),
}

impl PatchError {
    pub fn malformed(path: impl Into<Utf8PathBuf>, message: impl Into<String>) -> Self {
        PatchError::MalformedArtifact {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error comes from artifact contents rather than the environment.
    pub fn is_artifact_block(&self) -> bool {
        matches!(
            self,
            PatchError::MalformedArtifact { .. } | PatchError::MissingTarget { .. }
        )
    }

    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_artifact_block() { 2 } else { 1 }
    }
}

/// Result type alias using PatchError.
pub type PatchResult<T> = Result<T, PatchError>;
