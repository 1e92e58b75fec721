//! Error types for the tstcc-pipeline crate.
//!
//! Every variant is fatal for the invocation that raised it. Nothing is retried
//! and nothing is published once one of these is returned.

use crate::mode::TrainingMode;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for stage orchestration.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Unknown dataset '{name}' (known: {})", known.join(", "))]
    UnknownDataset { name: String, known: Vec<String> },

    #[error(
        "Missing artifact for mode '{mode}': predecessor stage '{predecessor}' has no checkpoint at {}",
        path.display()
    )]
    MissingArtifact {
        mode: TrainingMode,
        predecessor: TrainingMode,
        path: PathBuf,
    },

    #[error("Shape mismatch for parameter '{key}': target declares {expected:?}, source has {found:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Malformed artifact at {}: {reason}", path.display())]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("Invalid training mode: {0}")]
    InvalidMode(String),

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Missing data split for mode '{mode}': {}", path.display())]
    MissingData { mode: TrainingMode, path: PathBuf },

    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StageError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }
}
