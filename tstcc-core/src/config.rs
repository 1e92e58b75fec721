//! Runner settings for tstcc.
//!
//! Uses `figment` for layered configuration: defaults -> user file -> home file
//! -> explicit file -> environment. Dataset hyperparameters are not part of
//! these settings; they come from the immutable dataset registry.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up inside the project home directory.
pub const HOME_CONFIG_FILE: &str = "tstcc.toml";

/// Top-level runner settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// How parameters move between stages.
    #[serde(default)]
    pub transfer: TransferSettings,
    /// External training backend.
    #[serde(default)]
    pub backend: BackendSettings,
}

/// Parameter transfer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Data fraction of the fine-tuning stage that `SupCon` and
    /// `gen_pseudo_labels` bootstrap from (e.g. `"1p"`).
    #[serde(default = "default_bootstrap_fraction")]
    pub bootstrap_fraction: String,
    /// Key substrings never copied across a cross-task transfer, on top of
    /// the classifier layer, which is always excluded.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            bootstrap_fraction: default_bootstrap_fraction(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

fn default_bootstrap_fraction() -> String {
    "1p".to_string()
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["logits".to_string()]
}

/// Subprocess backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Python executable used to run the backend script.
    #[serde(default = "default_python_path")]
    pub python_path: PathBuf,
    /// Virtual environment; takes precedence over `python_path` when set.
    #[serde(default)]
    pub venv_path: Option<PathBuf>,
    /// Backend script, relative to the home directory unless absolute.
    #[serde(default = "default_script")]
    pub script: PathBuf,
    /// Upper bound for a single backend command (seconds).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            python_path: default_python_path(),
            venv_path: None,
            script: default_script(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_python_path() -> PathBuf {
    PathBuf::from("python3")
}

fn default_script() -> PathBuf {
    PathBuf::from("stage_backend.py")
}

fn default_timeout_secs() -> u64 {
    48 * 3600
}

/// Load settings from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`TSTCC_TRANSFER__BOOTSTRAP_FRACTION`, ...)
/// 2. Explicit file (`--config`)
/// 3. Home file (`<home>/tstcc.toml`)
/// 4. User config (`~/.config/tstcc/config.toml`)
/// 5. Built-in defaults
pub fn load_settings(
    home: &Path,
    explicit: Option<&Path>,
) -> Result<PipelineSettings, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineSettings::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "tstcc", "tstcc") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    let home_config = home.join(HOME_CONFIG_FILE);
    if home_config.exists() {
        figment = figment.merge(Toml::file(&home_config));
    }

    if let Some(path) = explicit {
        // A missing explicit file is an operator mistake, not an empty layer.
        if !path.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "config file not found: {}",
                path.display()
            ))));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TSTCC_").split("__"));

    figment.extract().map_err(Box::new)
}
