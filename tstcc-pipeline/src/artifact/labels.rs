//! Pseudo-label artifact written by `gen_pseudo_labels` and read by the
//! `SupCon` stages' data provider.

use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PSEUDO_LABEL_FILE: &str = "pseudo_train_data.pt";

/// Labels predicted for every sample of `source_split`, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoLabelArtifact {
    pub source_split: PathBuf,
    pub labels: Vec<u32>,
}

/// `<data_root>/pseudo_train_data.pt`
pub fn pseudo_label_path(data_root: &Path) -> PathBuf {
    data_root.join(PSEUDO_LABEL_FILE)
}

pub fn publish_pseudo_labels(
    path: &Path,
    artifact: &PseudoLabelArtifact,
) -> Result<(), StageError> {
    tstcc_core::atomic_write_json(path, artifact)?;
    tracing::info!(
        path = %path.display(),
        samples = artifact.labels.len(),
        "Pseudo labels published"
    );
    Ok(())
}
