//! # tstcc pipeline
//!
//! Stage orchestration for a multi-stage time-series representation learning
//! workflow. One invocation runs one training mode: it locates the checkpoint
//! the mode depends on, prepares freshly constructed models from it (partial
//! merge, wholesale load, or none), applies the mode's freeze policy, and hands
//! the result to the training, evaluation, or pseudo-labeling collaborator.
//!
//! Stages talk to each other only through files under
//! `<logs>/<experiment>/<run>/<mode>_seed_<seed>/saved_models/ckp_last.pt`.

pub mod artifact;
pub mod backend;
pub mod datasets;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod mode;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod tensor;
pub mod transfer;

pub use artifact::{ArtifactPathResolver, CheckpointArtifact, StageDescriptor};
pub use datasets::DatasetConfig;
pub use error::StageError;
pub use mode::{DataFraction, TrainingMode};
pub use model::{Device, ModelPair, ModelState};
pub use orchestrator::{Collaborators, StageOrchestrator, StageOutcome, StagePlan, StageRequest};
pub use registry::ConfigRegistry;
pub use tensor::{ParameterMapping, Tensor};
pub use transfer::{ExclusionPolicy, FreezePolicy, TransferPlan};
