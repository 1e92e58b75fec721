//! Subprocess training backend.
//!
//! Each collaborator call becomes one process:
//!
//! ```text
//! <python> <script> <command> <request.json>
//! ```
//!
//! `command` is `train`, `evaluate` or `pseudo_label`. The request file holds
//! the serialized job. The script writes exactly one JSON document to stdout:
//! a checkpoint (`{"model_state_dict": ...}`) for `train`, an evaluation report
//! for `evaluate`, `{"labels": [...]}` for `pseudo_label`. A non-zero exit is a
//! failed call.

use super::{
    EvaluationJob, EvaluationReport, Evaluator, PseudoLabelJob, PseudoLabeler, PseudoLabels,
    Trainer, TrainingJob,
};
use crate::artifact::CheckpointArtifact;
use crate::error::StageError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs the training backend script as a managed subprocess.
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    python_path: PathBuf,
    venv_path: Option<PathBuf>,
    script: PathBuf,
    workspace: PathBuf,
    timeout: Duration,
}

impl ScriptBackend {
    pub fn new(script: PathBuf, workspace: PathBuf) -> Self {
        Self {
            python_path: PathBuf::from("python3"),
            venv_path: None,
            script,
            workspace,
            timeout: Duration::from_secs(48 * 3600),
        }
    }

    /// Build from runner settings; a relative script path is taken from `home`.
    pub fn from_settings(settings: &tstcc_core::BackendSettings, home: &Path) -> Self {
        let script = if settings.script.is_absolute() {
            settings.script.clone()
        } else {
            home.join(&settings.script)
        };
        Self {
            python_path: settings.python_path.clone(),
            venv_path: settings.venv_path.clone(),
            script,
            workspace: home.to_path_buf(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn with_interpreter(mut self, python_path: PathBuf) -> Self {
        self.python_path = python_path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Effective interpreter (accounting for venv).
    fn python_cmd(&self) -> PathBuf {
        if let Some(venv) = &self.venv_path {
            let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
            venv.join(bin_dir).join("python")
        } else {
            self.python_path.clone()
        }
    }

    async fn invoke<R: DeserializeOwned>(
        &self,
        collaborator: &'static str,
        command: &str,
        request: &impl Serialize,
    ) -> Result<R, StageError> {
        // The request file lives until this call returns.
        let mut request_file = tempfile::Builder::new()
            .prefix("tstcc-request-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut request_file, request)?;
        request_file.flush()?;

        debug!(
            script = %self.script.display(),
            command,
            request = %request_file.path().display(),
            "Running backend script"
        );

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(self.python_cmd())
                .arg(&self.script)
                .arg(command)
                .arg(request_file.path())
                .current_dir(&self.workspace)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            StageError::Timeout(format!(
                "{collaborator} timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| StageError::collaborator(collaborator, format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::collaborator(
                collaborator,
                format!("script exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            StageError::collaborator(collaborator, format!("invalid JSON output: {e}"))
        })
    }
}

#[async_trait]
impl Trainer for ScriptBackend {
    async fn train(&self, job: TrainingJob<'_>) -> Result<CheckpointArtifact, StageError> {
        self.invoke("training loop", "train", &job).await
    }
}

#[async_trait]
impl Evaluator for ScriptBackend {
    async fn evaluate(&self, job: EvaluationJob<'_>) -> Result<EvaluationReport, StageError> {
        self.invoke("evaluation", "evaluate", &job).await
    }
}

#[async_trait]
impl PseudoLabeler for ScriptBackend {
    async fn generate(&self, job: PseudoLabelJob<'_>) -> Result<PseudoLabels, StageError> {
        self.invoke("pseudo labeling", "pseudo_label", &job).await
    }
}
