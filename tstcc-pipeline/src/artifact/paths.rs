//! Artifact locations and the stage dependency table.
//!
//! Layout: `<logs>/<experiment>/<run>/<mode>_seed_<seed>/saved_models/ckp_last.pt`.
//! Nothing here touches the filesystem.

use crate::mode::{DataFraction, Pretext, TrainingMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SAVED_MODELS_DIR: &str = "saved_models";
pub const CHECKPOINT_FILE: &str = "ckp_last.pt";
pub const MODEL_FILES_DIR: &str = "model_files";

/// Identifies one stage run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub experiment_id: String,
    pub run_id: String,
    pub mode: TrainingMode,
    pub seed: u64,
}

impl StageDescriptor {
    pub fn new(
        experiment_id: impl Into<String>,
        run_id: impl Into<String>,
        mode: TrainingMode,
        seed: u64,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            run_id: run_id.into(),
            mode,
            seed,
        }
    }

    /// Same experiment, run and seed; different mode.
    pub fn with_mode(&self, mode: TrainingMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    pub fn dir_name(&self) -> String {
        format!("{}_seed_{}", self.mode, self.seed)
    }
}

/// `<logs>/<experiment>/<run>`
pub fn run_root(base_dir: &Path, experiment_id: &str, run_id: &str) -> PathBuf {
    base_dir.join(experiment_id).join(run_id)
}

/// `<logs>/<experiment>/<run>/<mode>_seed_<seed>`
pub fn stage_dir(base_dir: &Path, descriptor: &StageDescriptor) -> PathBuf {
    run_root(base_dir, &descriptor.experiment_id, &descriptor.run_id).join(descriptor.dir_name())
}

/// The checkpoint a stage publishes on success.
pub fn checkpoint_path(base_dir: &Path, descriptor: &StageDescriptor) -> PathBuf {
    stage_dir(base_dir, descriptor)
        .join(SAVED_MODELS_DIR)
        .join(CHECKPOINT_FILE)
}

/// Maps a requested mode to the stage whose checkpoint it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArtifactPathResolver {
    bootstrap: DataFraction,
}

impl ArtifactPathResolver {
    /// `bootstrap` is the data fraction of the fine-tuning stage that `SupCon`
    /// and `gen_pseudo_labels` start from. It is fixed, not derived from the
    /// requested mode.
    pub fn new(bootstrap: DataFraction) -> Self {
        Self { bootstrap }
    }

    pub fn bootstrap(&self) -> DataFraction {
        self.bootstrap
    }

    /// The stage `mode` depends on, if any.
    pub fn predecessor(&self, mode: &TrainingMode) -> Option<TrainingMode> {
        match mode {
            TrainingMode::FineTune(d) | TrainingMode::TrainLinear(d) => Some(match d.pretext {
                Pretext::SelfSupervised => TrainingMode::SelfSupervised,
                Pretext::SupCon => TrainingMode::SupCon,
            }),
            TrainingMode::GenPseudoLabels | TrainingMode::SupCon => {
                Some(TrainingMode::fine_tune_at(self.bootstrap))
            }
            TrainingMode::SelfSupervised
            | TrainingMode::SupConPseudo
            | TrainingMode::Supervised
            | TrainingMode::RandomInit => None,
        }
    }

    /// Checkpoint path of the predecessor of `mode` within the same
    /// experiment, run and seed.
    pub fn resolve(
        &self,
        base_dir: &Path,
        experiment_id: &str,
        run_id: &str,
        mode: &TrainingMode,
        seed: u64,
    ) -> Option<PathBuf> {
        self.predecessor(mode).map(|predecessor| {
            checkpoint_path(
                base_dir,
                &StageDescriptor::new(experiment_id, run_id, predecessor, seed),
            )
        })
    }
}
