//! Stage orchestrator: one invocation runs exactly one training mode.
//!
//! Sequence: resolve predecessor, load its checkpoint (fatal if absent), build
//! fresh models, apply the mode's transfer plan, then hand off to the
//! collaborators. `gen_pseudo_labels` ends after inference; every other mode
//! trains and, unless it only learns a representation, evaluates. The stage's
//! consumable artifact is published last, so a failed stage leaves none.

use crate::artifact::{
    self, ArtifactPathResolver, CheckpointArtifact, PreparedCheckpoint, PseudoLabelArtifact,
    PublishedCheckpoint, StageDescriptor,
};
use crate::backend::{
    DataProvider, EvaluationJob, Evaluator, ModelFactory, PseudoLabelJob, PseudoLabeler, Trainer,
    TrainingJob,
};
use crate::datasets::DatasetConfig;
use crate::error::StageError;
use crate::manifest::{EnvironmentSnapshot, RunManifest, snapshot_config};
use crate::metrics::ClassificationReport;
use crate::mode::TrainingMode;
use crate::model::{Device, ModelPair, OptimizerSpec};
use crate::registry::ConfigRegistry;
use crate::transfer::{self, ExclusionPolicy, FreezePolicy, TransferPlan};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One requested stage run.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub descriptor: StageDescriptor,
    pub dataset: String,
    /// Parent of the per-dataset data directories.
    pub data_path: PathBuf,
    pub logs_dir: PathBuf,
    pub device: Device,
}

/// The predecessor stage a request consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Predecessor {
    pub mode: TrainingMode,
    pub checkpoint: PathBuf,
}

/// Everything decided before any I/O.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub config: DatasetConfig,
    pub predecessor: Option<Predecessor>,
    pub transfer: TransferPlan,
    pub run_root: PathBuf,
    pub stage_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub data_root: PathBuf,
}

/// How an invocation ended.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Trained {
        checkpoint: PublishedCheckpoint,
        report: Option<ClassificationReport>,
    },
    PseudoLabels {
        path: PathBuf,
        samples: usize,
    },
}

/// The external collaborators a stage is handed to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub models: &'a dyn ModelFactory,
    pub data: &'a dyn DataProvider,
    pub trainer: &'a dyn Trainer,
    pub evaluator: &'a dyn Evaluator,
    pub labeler: &'a dyn PseudoLabeler,
}

/// Counts carried into the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TransferSummary {
    transferred: usize,
    frozen: usize,
}

pub struct StageOrchestrator<'a> {
    registry: &'a ConfigRegistry,
    resolver: ArtifactPathResolver,
    exclusion: ExclusionPolicy,
    collaborators: Collaborators<'a>,
}

impl<'a> StageOrchestrator<'a> {
    pub fn new(registry: &'a ConfigRegistry, collaborators: Collaborators<'a>) -> Self {
        Self {
            registry,
            resolver: ArtifactPathResolver::default(),
            exclusion: ExclusionPolicy::classifier(),
            collaborators,
        }
    }

    pub fn with_resolver(mut self, resolver: ArtifactPathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Extra key patterns kept out of cross-task transfers. The classifier
    /// layer stays excluded regardless.
    pub fn with_exclusion(mut self, exclusion: ExclusionPolicy) -> Self {
        self.exclusion = exclusion.with_classifier();
        self
    }

    /// Resolve configuration and every path the request touches. Pure apart
    /// from the registry lookup; creates nothing on disk.
    pub fn plan(&self, request: &StageRequest) -> Result<StagePlan, StageError> {
        let config = self.registry.create(&request.dataset)?;
        let descriptor = &request.descriptor;
        let predecessor = self.resolver.predecessor(&descriptor.mode).map(|mode| Predecessor {
            mode,
            checkpoint: artifact::checkpoint_path(&request.logs_dir, &descriptor.with_mode(mode)),
        });

        Ok(StagePlan {
            config,
            predecessor,
            transfer: TransferPlan::for_mode(&descriptor.mode, &self.exclusion),
            run_root: artifact::run_root(
                &request.logs_dir,
                &descriptor.experiment_id,
                &descriptor.run_id,
            ),
            stage_dir: artifact::stage_dir(&request.logs_dir, descriptor),
            checkpoint: artifact::checkpoint_path(&request.logs_dir, descriptor),
            data_root: request.data_path.join(&request.dataset),
        })
    }

    /// Plan and execute in one step.
    pub async fn run(&self, request: &StageRequest) -> Result<StageOutcome, StageError> {
        let plan = self.plan(request)?;
        self.execute(request, plan).await
    }

    /// Execute a plan produced by [`Self::plan`] for the same request.
    pub async fn execute(
        &self,
        request: &StageRequest,
        plan: StagePlan,
    ) -> Result<StageOutcome, StageError> {
        let started_at = Utc::now();
        let mode = request.descriptor.mode;
        info!(
            dataset = %request.dataset,
            mode = %mode,
            seed = request.descriptor.seed,
            "Starting stage"
        );

        let source = match &plan.predecessor {
            Some(predecessor) => Some(self.load_predecessor(mode, predecessor)?),
            None => None,
        };

        let mut models =
            self.collaborators
                .models
                .build(&plan.config, request.descriptor.seed, &request.device)?;
        let summary = self.apply_transfer(&plan, source.as_ref(), &mut models)?;
        info!(
            transferred = summary.transferred,
            frozen = summary.frozen,
            "Model prepared"
        );

        let model_optimizer = OptimizerSpec::adam(&plan.config, &models.model);
        let temporal_contr_optimizer =
            OptimizerSpec::adam(&plan.config, &models.temporal_contr_model);

        let data = self
            .collaborators
            .data
            .splits(&plan.data_root, &plan.config, &mode)?;
        debug!(train = %data.train.display(), "Data loaded");

        if mode == TrainingMode::GenPseudoLabels {
            let labels = self
                .collaborators
                .labeler
                .generate(PseudoLabelJob {
                    config: &plan.config,
                    device: &request.device,
                    models: &models,
                    train: &data.train,
                })
                .await?;
            let path = artifact::pseudo_label_path(&plan.data_root);
            let samples = labels.labels.len();
            self.write_manifest(request, &plan, summary, None, started_at)?;
            // Published last: downstream stages consume this file.
            artifact::publish_pseudo_labels(
                &path,
                &PseudoLabelArtifact {
                    source_split: data.train.clone(),
                    labels: labels.labels,
                },
            )?;
            return Ok(StageOutcome::PseudoLabels { path, samples });
        }

        let trained = self
            .collaborators
            .trainer
            .train(TrainingJob {
                mode: &mode,
                config: &plan.config,
                device: &request.device,
                models: &models,
                model_optimizer: &model_optimizer,
                temporal_contr_optimizer: &temporal_contr_optimizer,
                data: &data,
                experiment_log_dir: &plan.stage_dir,
            })
            .await?;
        self.adopt_trained(&plan.checkpoint, &trained, &mut models)?;
        let prepared = PreparedCheckpoint::new(&trained)?;

        if mode.snapshots_config() {
            if let Some(path) = snapshot_config(&plan.run_root, &request.dataset, &plan.config)? {
                debug!(path = %path.display(), "Configuration snapshot written");
            }
        }

        let report = if mode.evaluates() {
            let evaluation = self
                .collaborators
                .evaluator
                .evaluate(EvaluationJob {
                    mode: &mode,
                    device: &request.device,
                    models: &models,
                    test: &data.test,
                })
                .await?;
            let report = ClassificationReport::new(&evaluation, plan.config.num_classes);
            let path = report.save(&plan.stage_dir)?;
            info!(
                loss = report.loss,
                accuracy = report.metrics.accuracy,
                macro_f1 = report.metrics.macro_f1,
                path = %path.display(),
                "Evaluation complete"
            );
            Some(report)
        } else {
            None
        };

        self.write_manifest(request, &plan, summary, Some(prepared.hash()), started_at)?;
        // Published last: a failure anywhere above leaves no checkpoint behind.
        let published = prepared.publish(&plan.checkpoint)?;
        Ok(StageOutcome::Trained {
            checkpoint: published,
            report,
        })
    }

    fn load_predecessor(
        &self,
        mode: TrainingMode,
        predecessor: &Predecessor,
    ) -> Result<CheckpointArtifact, StageError> {
        let loaded = artifact::load_checkpoint(&predecessor.checkpoint)?.ok_or_else(|| {
            StageError::MissingArtifact {
                mode,
                predecessor: predecessor.mode,
                path: predecessor.checkpoint.clone(),
            }
        })?;
        info!(
            predecessor = %predecessor.mode,
            path = %predecessor.checkpoint.display(),
            "Loaded predecessor checkpoint"
        );
        Ok(loaded)
    }

    fn apply_transfer(
        &self,
        plan: &StagePlan,
        source: Option<&CheckpointArtifact>,
        models: &mut ModelPair,
    ) -> Result<TransferSummary, StageError> {
        let require_source = || {
            source.ok_or_else(|| {
                StageError::InvalidMode(
                    "transfer requested without a predecessor checkpoint".into(),
                )
            })
        };
        let origin = plan
            .predecessor
            .as_ref()
            .map(|p| p.checkpoint.as_path())
            .unwrap_or(Path::new(""));

        match &plan.transfer {
            TransferPlan::Fresh => Ok(TransferSummary::default()),
            TransferPlan::Merge { exclusion, freeze } => {
                let source = require_source()?;
                let outcome = transfer::merge(
                    &source.model_state_dict,
                    models.model.parameters(),
                    exclusion,
                )?;
                let policy = transfer::freeze_set(*freeze, &outcome.transferred);
                let summary = TransferSummary {
                    transferred: outcome.transferred.len(),
                    frozen: policy.len(),
                };
                models.model.set_parameters(outcome.merged);
                models.model.freeze(policy);
                Ok(summary)
            }
            TransferPlan::Wholesale => {
                let source = require_source()?;
                let loaded =
                    transfer::load_strict(&source.model_state_dict, models.model.parameters())
                        .map_err(|e| e.into_stage_error(origin))?;
                let summary = TransferSummary {
                    transferred: loaded.len(),
                    frozen: 0,
                };
                models.model.set_parameters(loaded);
                Ok(summary)
            }
            TransferPlan::FreezeAllExcept { exclusion } => {
                let policy = FreezePolicy::all_except(models.model.parameters(), exclusion);
                let summary = TransferSummary {
                    transferred: 0,
                    frozen: policy.len(),
                };
                models.model.freeze(policy);
                Ok(summary)
            }
        }
    }

    /// The trained state must fit the prepared architecture exactly; otherwise
    /// nothing is published.
    fn adopt_trained(
        &self,
        destination: &Path,
        trained: &CheckpointArtifact,
        models: &mut ModelPair,
    ) -> Result<(), StageError> {
        let model = transfer::load_strict(&trained.model_state_dict, models.model.parameters())
            .map_err(|e| e.into_stage_error(destination))?;
        models.model.set_parameters(model);

        if !trained.temporal_contr_model_state_dict.is_empty() {
            let tc = transfer::load_strict(
                &trained.temporal_contr_model_state_dict,
                models.temporal_contr_model.parameters(),
            )
            .map_err(|e| e.into_stage_error(destination))?;
            models.temporal_contr_model.set_parameters(tc);
        }
        Ok(())
    }

    fn write_manifest(
        &self,
        request: &StageRequest,
        plan: &StagePlan,
        summary: TransferSummary,
        checkpoint_hash: Option<&str>,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<(), StageError> {
        let manifest = RunManifest {
            id: uuid::Uuid::new_v4().to_string(),
            descriptor: request.descriptor.clone(),
            dataset: request.dataset.clone(),
            device: request.device.clone(),
            predecessor_checkpoint: plan.predecessor.as_ref().map(|p| p.checkpoint.clone()),
            transferred_keys: summary.transferred,
            frozen_keys: summary.frozen,
            checkpoint_hash: checkpoint_hash.map(str::to_string),
            environment: EnvironmentSnapshot::capture(),
            started_at,
            finished_at: Utc::now(),
        };
        manifest.save(&plan.stage_dir)?;
        Ok(())
    }
}
