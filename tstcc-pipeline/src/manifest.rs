//! Reproducibility records: environment snapshot, run manifest, config snapshot.

use crate::artifact::StageDescriptor;
use crate::artifact::paths::MODEL_FILES_DIR;
use crate::datasets::DatasetConfig;
use crate::model::Device;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "run_manifest.json";
pub const CONFIG_SNAPSHOT_FILE: &str = "config.json";

/// Snapshot of the environment a stage ran in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub system_info: String,
    pub platform: String,
    pub crate_version: String,
    pub timestamp: DateTime<Utc>,
    /// Hash of device-relevant environment variables.
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture() -> Self {
        Self {
            system_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            platform: std::env::consts::OS.to_string(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in &["CUDA_VISIBLE_DEVICES", "PYTHONPATH", "VIRTUAL_ENV"] {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Written into the stage directory when a stage completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: String,
    pub descriptor: StageDescriptor,
    pub dataset: String,
    pub device: Device,
    pub predecessor_checkpoint: Option<PathBuf>,
    pub transferred_keys: usize,
    pub frozen_keys: usize,
    pub checkpoint_hash: Option<String>,
    pub environment: EnvironmentSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunManifest {
    pub fn save(&self, stage_dir: &Path) -> std::io::Result<()> {
        tstcc_core::atomic_write_json(&stage_dir.join(MANIFEST_FILE), self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub dataset: String,
    pub config: DatasetConfig,
}

/// Record the dataset configuration under `<run_root>/model_files/`. Done
/// once per run root; an existing snapshot is left in place.
pub fn snapshot_config(
    run_root: &Path,
    dataset: &str,
    config: &DatasetConfig,
) -> std::io::Result<Option<PathBuf>> {
    let path = run_root.join(MODEL_FILES_DIR).join(CONFIG_SNAPSHOT_FILE);
    if path.exists() {
        return Ok(None);
    }
    let snapshot = ConfigSnapshot {
        dataset: dataset.to_string(),
        config: config.clone(),
    };
    tstcc_core::atomic_write_json(&path, &snapshot)?;
    Ok(Some(path))
}
