//! Collaborator seams.
//!
//! The orchestrator never trains, evaluates, or reads sample data itself. It
//! prepares models and hands them to these traits. [`layout`], [`data`] and
//! [`script`] provide the implementations the CLI wires up.

pub mod data;
pub mod layout;
pub mod script;

use crate::artifact::CheckpointArtifact;
use crate::datasets::DatasetConfig;
use crate::error::StageError;
use crate::mode::TrainingMode;
use crate::model::{Device, ModelPair, OptimizerSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use data::SplitFileProvider;
pub use layout::LayoutModelFactory;
pub use script::ScriptBackend;

/// Locations of the train / validation / test splits for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplits {
    pub train: PathBuf,
    pub valid: PathBuf,
    pub test: PathBuf,
}

/// Everything the training loop receives.
#[derive(Debug, Serialize)]
pub struct TrainingJob<'a> {
    pub mode: &'a TrainingMode,
    pub config: &'a DatasetConfig,
    pub device: &'a Device,
    pub models: &'a ModelPair,
    pub model_optimizer: &'a OptimizerSpec,
    pub temporal_contr_optimizer: &'a OptimizerSpec,
    pub data: &'a DataSplits,
    pub experiment_log_dir: &'a Path,
}

/// Input to evaluation on the test split.
#[derive(Debug, Serialize)]
pub struct EvaluationJob<'a> {
    pub mode: &'a TrainingMode,
    pub device: &'a Device,
    pub models: &'a ModelPair,
    pub test: &'a Path,
}

/// Aggregate loss/accuracy plus per-example predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub loss: f64,
    pub accuracy: f64,
    pub predictions: Vec<u32>,
    pub labels: Vec<u32>,
}

/// Input to pseudo-label inference over the train split.
#[derive(Debug, Serialize)]
pub struct PseudoLabelJob<'a> {
    pub config: &'a DatasetConfig,
    pub device: &'a Device,
    pub models: &'a ModelPair,
    pub train: &'a Path,
}

/// Predicted label per train sample, in split order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoLabels {
    pub labels: Vec<u32>,
}

/// Builds freshly initialized models for a configuration.
pub trait ModelFactory: Send + Sync {
    fn build(&self, config: &DatasetConfig, seed: u64, device: &Device)
    -> Result<ModelPair, StageError>;
}

/// Locates the data splits a mode trains and evaluates on.
pub trait DataProvider: Send + Sync {
    fn splits(
        &self,
        data_root: &Path,
        config: &DatasetConfig,
        mode: &TrainingMode,
    ) -> Result<DataSplits, StageError>;
}

/// Runs the training protocol and returns the last-epoch state.
#[async_trait]
pub trait Trainer: Send + Sync {
    async fn train(&self, job: TrainingJob<'_>) -> Result<CheckpointArtifact, StageError>;
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, job: EvaluationJob<'_>) -> Result<EvaluationReport, StageError>;
}

#[async_trait]
pub trait PseudoLabeler: Send + Sync {
    async fn generate(&self, job: PseudoLabelJob<'_>) -> Result<PseudoLabels, StageError>;
}
