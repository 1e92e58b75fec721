//! Dataset configuration records.
//!
//! One immutable record per dataset. The built-in records cover human activity
//! recognition (`HAR`), sleep staging (`EEG`), seizure detection (`Epilepsy`)
//! and bearing fault diagnosis (`pFD`).

use serde::{Deserialize, Serialize};

/// Hyperparameters for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    // Model
    pub input_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub final_out_channels: usize,
    pub num_classes: usize,
    pub dropout: f64,
    pub features_len: usize,

    // Training
    pub num_epoch: usize,

    // Optimizer
    pub beta1: f64,
    pub beta2: f64,
    pub lr: f64,

    // Data
    pub drop_last: bool,
    pub batch_size: usize,

    pub context_cont: ContextContConfig,
    pub tc: TemporalContrastConfig,
    pub augmentation: AugmentationConfig,
}

/// Contextual contrasting loss settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextContConfig {
    pub temperature: f64,
    pub use_cosine_similarity: bool,
}

/// Temporal contrasting model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContrastConfig {
    pub hidden_dim: usize,
    pub timesteps: usize,
}

/// Weak/strong augmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    pub jitter_scale_ratio: f64,
    pub jitter_ratio: f64,
    pub max_seg: usize,
}

impl DatasetConfig {
    pub fn epilepsy() -> Self {
        Self {
            input_channels: 1,
            kernel_size: 8,
            stride: 1,
            final_out_channels: 128,
            num_classes: 2,
            dropout: 0.35,
            features_len: 24,
            num_epoch: 40,
            beta1: 0.9,
            beta2: 0.99,
            lr: 3e-4,
            drop_last: true,
            batch_size: 128,
            context_cont: ContextContConfig::default(),
            tc: TemporalContrastConfig {
                hidden_dim: 100,
                timesteps: 10,
            },
            augmentation: AugmentationConfig {
                jitter_scale_ratio: 0.001,
                jitter_ratio: 0.001,
                max_seg: 5,
            },
        }
    }

    pub fn har() -> Self {
        Self {
            input_channels: 9,
            kernel_size: 8,
            stride: 1,
            final_out_channels: 128,
            num_classes: 6,
            dropout: 0.35,
            features_len: 18,
            num_epoch: 40,
            beta1: 0.9,
            beta2: 0.99,
            lr: 3e-4,
            drop_last: true,
            batch_size: 128,
            context_cont: ContextContConfig::default(),
            tc: TemporalContrastConfig {
                hidden_dim: 100,
                timesteps: 6,
            },
            augmentation: AugmentationConfig {
                jitter_scale_ratio: 1.1,
                jitter_ratio: 0.8,
                max_seg: 8,
            },
        }
    }

    pub fn sleep_edf() -> Self {
        Self {
            input_channels: 1,
            kernel_size: 25,
            stride: 3,
            final_out_channels: 128,
            num_classes: 5,
            dropout: 0.35,
            features_len: 127,
            num_epoch: 40,
            beta1: 0.9,
            beta2: 0.99,
            lr: 3e-4,
            drop_last: true,
            batch_size: 128,
            context_cont: ContextContConfig::default(),
            tc: TemporalContrastConfig {
                hidden_dim: 64,
                timesteps: 50,
            },
            augmentation: AugmentationConfig {
                jitter_scale_ratio: 1.5,
                jitter_ratio: 2.0,
                max_seg: 12,
            },
        }
    }

    pub fn fault_diagnosis() -> Self {
        Self {
            input_channels: 1,
            kernel_size: 32,
            stride: 4,
            final_out_channels: 128,
            num_classes: 3,
            dropout: 0.35,
            features_len: 162,
            num_epoch: 40,
            beta1: 0.9,
            beta2: 0.99,
            lr: 3e-4,
            drop_last: true,
            batch_size: 64,
            context_cont: ContextContConfig::default(),
            tc: TemporalContrastConfig {
                hidden_dim: 64,
                timesteps: 10,
            },
            augmentation: AugmentationConfig {
                jitter_scale_ratio: 2.0,
                jitter_ratio: 0.1,
                max_seg: 5,
            },
        }
    }
}

impl Default for ContextContConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            use_cosine_similarity: true,
        }
    }
}
