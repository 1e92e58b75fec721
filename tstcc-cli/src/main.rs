//! tstcc CLI: runs one stage of the representation-learning pipeline.
//!
//! Each invocation trains (or pseudo-labels) in exactly one mode. Stages chain
//! through checkpoints under the logs directory, so a full experiment is a
//! sequence of invocations sharing experiment, run, and seed.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use tstcc_pipeline::artifact::ArtifactPathResolver;
use tstcc_pipeline::backend::{LayoutModelFactory, ScriptBackend, SplitFileProvider};
use tstcc_pipeline::{
    Collaborators, ConfigRegistry, DataFraction, Device, ExclusionPolicy, StageDescriptor,
    StageOrchestrator, StageOutcome, StageRequest, TrainingMode,
};

/// tstcc: staged contrastive pretraining and fine-tuning for time series
#[derive(Parser, Debug)]
#[command(name = "tstcc", version, about, long_about = None)]
struct Cli {
    /// Experiment description
    #[arg(long = "experiment_description", default_value = "HAR_experiments")]
    experiment_description: String,

    /// Run description
    #[arg(long = "run_description", default_value = "test1")]
    run_description: String,

    /// Seed value
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// self_supervised, supervised, fine_tune[_SupCon][_<n>p], train_linear[_SupCon][_<n>p],
    /// ft_<n>p, tl_<n>p, random_init, gen_pseudo_labels, SupCon, SupCon_pseudo
    #[arg(long = "training_mode", default_value = "self_supervised")]
    training_mode: String,

    /// Dataset of choice: Epilepsy, HAR, pFD, EEG
    #[arg(long = "selected_dataset", default_value = "HAR")]
    selected_dataset: String,

    /// Path containing the per-dataset data directories
    #[arg(long = "data_path", default_value = "data/")]
    data_path: PathBuf,

    /// Directory stage outputs are saved under
    #[arg(long = "logs_save_dir", default_value = "experiments_logs")]
    logs_save_dir: PathBuf,

    /// cpu, cuda, cuda:<n> or mps
    #[arg(long, default_value = "cuda:0")]
    device: String,

    /// Project home directory (defaults to the current directory)
    #[arg(long = "home_path")]
    home_path: Option<PathBuf>,

    /// Runner settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors to stderr
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn stderr_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

/// Human-readable stderr plus a JSON log file inside the stage directory.
fn init_tracing(cli: &Cli, stage_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(cli.stderr_filter()));

    let file_name = format!(
        "logs_{}.log",
        chrono::Local::now().format("%d_%m_%Y_%H_%M_%S")
    );
    let file_appender = tracing_appender::rolling::never(stage_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let home = match &cli.home_path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };
    let settings = tstcc_core::load_settings(&home, cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let mode: TrainingMode = cli.training_mode.parse()?;
    let device: Device = cli.device.parse()?;
    let bootstrap: DataFraction = settings
        .transfer
        .bootstrap_fraction
        .parse()
        .context("Invalid transfer.bootstrap_fraction setting")?;

    let registry = ConfigRegistry::builtin();
    let backend = ScriptBackend::from_settings(&settings.backend, &home);
    let collaborators = Collaborators {
        models: &LayoutModelFactory,
        data: &SplitFileProvider,
        trainer: &backend,
        evaluator: &backend,
        labeler: &backend,
    };
    let orchestrator = StageOrchestrator::new(&registry, collaborators)
        .with_resolver(ArtifactPathResolver::new(bootstrap))
        .with_exclusion(ExclusionPolicy::new(
            settings.transfer.exclude_patterns.iter().cloned(),
        ));

    let request = StageRequest {
        descriptor: StageDescriptor::new(
            cli.experiment_description.clone(),
            cli.run_description.clone(),
            mode,
            cli.seed,
        ),
        dataset: cli.selected_dataset.clone(),
        data_path: resolve(&home, &cli.data_path),
        logs_dir: resolve(&home, &cli.logs_save_dir),
        device,
    };

    // Unknown datasets abort here, before anything is created on disk.
    let plan = orchestrator.plan(&request)?;
    std::fs::create_dir_all(&plan.stage_dir).with_context(|| {
        format!(
            "Cannot create stage directory {}",
            plan.stage_dir.display()
        )
    })?;
    let _guard = init_tracing(&cli, &plan.stage_dir);

    info!(
        dataset = %request.dataset,
        method = "TS-TCC",
        mode = %mode,
        seed = cli.seed,
        device = %request.device,
        script = %backend.script().display(),
        "Stage configured"
    );

    let start = Instant::now();
    let outcome = orchestrator
        .execute(&request, plan)
        .await
        .with_context(|| format!("Stage '{mode}' failed"))?;

    match &outcome {
        StageOutcome::Trained { checkpoint, report } => {
            info!(path = %checkpoint.path.display(), hash = %checkpoint.hash, "Checkpoint saved");
            if let Some(report) = report {
                info!(
                    loss = report.loss,
                    accuracy = report.metrics.accuracy,
                    macro_f1 = report.metrics.macro_f1,
                    "Test results"
                );
            }
        }
        StageOutcome::PseudoLabels { path, samples } => {
            info!(path = %path.display(), samples, "Pseudo labels saved");
        }
    }
    info!(elapsed = ?start.elapsed(), "Training time");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["tstcc"]).unwrap();
        assert_eq!(cli.experiment_description, "HAR_experiments");
        assert_eq!(cli.run_description, "test1");
        assert_eq!(cli.seed, 0);
        assert_eq!(cli.training_mode, "self_supervised");
        assert_eq!(cli.selected_dataset, "HAR");
        assert_eq!(cli.data_path, PathBuf::from("data/"));
        assert_eq!(cli.logs_save_dir, PathBuf::from("experiments_logs"));
        assert_eq!(cli.device, "cuda:0");
        assert!(cli.home_path.is_none());
    }

    #[test]
    fn test_underscore_flags() {
        let cli = Cli::try_parse_from([
            "tstcc",
            "--experiment_description",
            "exp1",
            "--training_mode",
            "ft_1p",
            "--selected_dataset",
            "Epilepsy",
            "--seed",
            "3",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.experiment_description, "exp1");
        assert_eq!(cli.training_mode, "ft_1p");
        assert_eq!(cli.selected_dataset, "Epilepsy");
        assert_eq!(cli.seed, 3);
        assert_eq!(cli.stderr_filter(), "trace");
    }

    #[test]
    fn test_quiet_filter() {
        let cli = Cli::try_parse_from(["tstcc", "--quiet"]).unwrap();
        assert_eq!(cli.stderr_filter(), "error");
    }

    #[test]
    fn test_resolve_relative_to_home() {
        let home = Path::new("/proj");
        assert_eq!(resolve(home, Path::new("data/")), PathBuf::from("/proj/data/"));
        assert_eq!(resolve(home, Path::new("/abs/logs")), PathBuf::from("/abs/logs"));
    }
}
