//! Checkpoint artifacts: the write-once parameter snapshot a stage leaves behind.

use crate::error::StageError;
use crate::tensor::ParameterMapping;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Last-epoch snapshot of a stage's models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointArtifact {
    pub model_state_dict: ParameterMapping,
    #[serde(default, skip_serializing_if = "ParameterMapping::is_empty")]
    pub temporal_contr_model_state_dict: ParameterMapping,
}

/// Where and what was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCheckpoint {
    pub path: PathBuf,
    pub hash: String,
    pub size_bytes: u64,
}

/// Read a checkpoint. `Ok(None)` means nothing has been published at `path`.
pub fn load_checkpoint(path: &Path) -> Result<Option<CheckpointArtifact>, StageError> {
    if !path.is_file() {
        return Ok(None);
    }

    let bytes = std::fs::read(path)?;
    let artifact: CheckpointArtifact = serde_json::from_slice(&bytes)
        .map_err(|e| StageError::malformed(path, e.to_string()))?;

    for (name, mapping) in [
        ("model_state_dict", &artifact.model_state_dict),
        (
            "temporal_contr_model_state_dict",
            &artifact.temporal_contr_model_state_dict,
        ),
    ] {
        if let Some(key) = mapping.first_inconsistent() {
            return Err(StageError::malformed(
                path,
                format!("{name}.{key}: data length does not match shape"),
            ));
        }
    }

    debug!(
        path = %path.display(),
        parameters = artifact.model_state_dict.len(),
        hash = %tstcc_core::sha256_hex(&bytes),
        "Loaded checkpoint"
    );
    Ok(Some(artifact))
}

/// A checkpoint serialized and hashed but not yet visible on disk.
#[derive(Debug, Clone)]
pub struct PreparedCheckpoint {
    bytes: Vec<u8>,
    hash: String,
}

impl PreparedCheckpoint {
    pub fn new(artifact: &CheckpointArtifact) -> Result<Self, StageError> {
        let bytes = serde_json::to_vec(artifact)?;
        let hash = tstcc_core::sha256_hex(&bytes);
        Ok(Self { bytes, hash })
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Make the checkpoint visible at `path`, all or nothing.
    pub fn publish(self, path: &Path) -> Result<PublishedCheckpoint, StageError> {
        tstcc_core::atomic_write(path, &self.bytes)?;
        info!(path = %path.display(), hash = %self.hash, "Checkpoint published");
        Ok(PublishedCheckpoint {
            path: path.to_path_buf(),
            size_bytes: self.bytes.len() as u64,
            hash: self.hash,
        })
    }
}

/// Publish `artifact` at `path`, all or nothing.
pub fn publish_checkpoint(
    path: &Path,
    artifact: &CheckpointArtifact,
) -> Result<PublishedCheckpoint, StageError> {
    PreparedCheckpoint::new(artifact)?.publish(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;
    use tempfile::TempDir;

    fn artifact() -> CheckpointArtifact {
        let mut model = ParameterMapping::new();
        model.insert("conv_block1.0.weight", Tensor::full(vec![2, 1, 3], 0.25));
        model.insert("logits.bias", Tensor::zeros(vec![2]));
        CheckpointArtifact {
            model_state_dict: model,
            temporal_contr_model_state_dict: ParameterMapping::new(),
        }
    }

    #[test]
    fn test_absent_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(
            load_checkpoint(&dir.path().join("ckp_last.pt"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_publish_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved_models").join("ckp_last.pt");

        let published = publish_checkpoint(&path, &artifact()).unwrap();
        assert_eq!(published.hash.len(), 64);
        assert_eq!(load_checkpoint(&path).unwrap(), Some(artifact()));
    }

    #[test]
    fn test_prepared_checkpoint_is_invisible_until_published() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckp_last.pt");

        let prepared = PreparedCheckpoint::new(&artifact()).unwrap();
        let hash = prepared.hash().to_string();
        assert!(!path.exists());

        let published = prepared.publish(&path).unwrap();
        assert_eq!(published.hash, hash);
        assert_eq!(
            tstcc_core::sha256_hex(&std::fs::read(&path).unwrap()),
            hash
        );
    }

    #[test]
    fn test_model_state_dict_key_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckp_last.pt");
        publish_checkpoint(&path, &artifact()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw.get("model_state_dict").is_some());
    }

    #[test]
    fn test_missing_state_dict_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckp_last.pt");
        std::fs::write(&path, br#"{"optimizer": {}}"#).unwrap();

        assert!(matches!(
            load_checkpoint(&path),
            Err(StageError::MalformedArtifact { .. })
        ));
    }

    #[test]
    fn test_inconsistent_tensor_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckp_last.pt");
        std::fs::write(
            &path,
            br#"{"model_state_dict": {"logits.bias": {"shape": [3], "data": [0.0]}}}"#,
        )
        .unwrap();

        match load_checkpoint(&path) {
            Err(StageError::MalformedArtifact { reason, .. }) => {
                assert!(reason.contains("logits.bias"));
            }
            other => panic!("expected MalformedArtifact, got {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_shape_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckp_last.pt");
        std::fs::write(
            &path,
            br#"{"model_state_dict": {"conv.w": {"shape": [18446744073709551615, 2], "data": []}}}"#,
        )
        .unwrap();

        match load_checkpoint(&path) {
            Err(StageError::MalformedArtifact { reason, .. }) => {
                assert!(reason.contains("conv.w"));
            }
            other => panic!("expected MalformedArtifact, got {other:?}"),
        }
    }
}
