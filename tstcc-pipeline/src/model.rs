//! Prepared models: parameters plus the keys the optimizer must leave alone.

use crate::datasets::DatasetConfig;
use crate::error::StageError;
use crate::tensor::ParameterMapping;
use crate::transfer::FreezePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compute device handed through to the collaborators (`cpu`, `cuda`, `cuda:1`, `mps`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Device(String);

impl Device {
    pub fn cpu() -> Self {
        Self("cpu".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Device {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = match s {
            "cpu" | "cuda" | "mps" => true,
            _ => s
                .strip_prefix("cuda:")
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        };
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(StageError::InvalidDevice(s.to_string()))
        }
    }
}

impl TryFrom<String> for Device {
    type Error = StageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(d: Device) -> Self {
        d.0
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One model's parameters and freeze set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    parameters: ParameterMapping,
    frozen: FreezePolicy,
}

impl ModelState {
    pub fn new(parameters: ParameterMapping) -> Self {
        Self {
            parameters,
            frozen: FreezePolicy::empty(),
        }
    }

    pub fn parameters(&self) -> &ParameterMapping {
        &self.parameters
    }

    /// Replace the parameter values. The key set is the caller's responsibility;
    /// use the transfer functions to produce `parameters`.
    pub fn set_parameters(&mut self, parameters: ParameterMapping) {
        self.parameters = parameters;
    }

    /// Mark keys as non-trainable. Keys the model does not declare are ignored.
    pub fn freeze(&mut self, policy: FreezePolicy) {
        let declared: std::collections::BTreeSet<String> = policy
            .keys()
            .iter()
            .filter(|k| self.parameters.contains_key(k))
            .cloned()
            .collect();
        self.frozen = FreezePolicy::transferred(&declared);
    }

    pub fn frozen(&self) -> &FreezePolicy {
        &self.frozen
    }

    pub fn is_trainable(&self, key: &str) -> bool {
        self.parameters.contains_key(key) && !self.frozen.contains(key)
    }

    pub fn trainable_keys(&self) -> Vec<String> {
        self.parameters
            .keys()
            .filter(|k| !self.frozen.contains(k))
            .map(str::to_string)
            .collect()
    }
}

/// Representation model plus its temporal-contrasting companion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPair {
    pub model: ModelState,
    pub temporal_contr_model: ModelState,
}

/// Optimizer settings handed to the training backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSpec {
    pub kind: String,
    pub lr: f64,
    pub betas: (f64, f64),
    pub weight_decay: f64,
    /// Only these keys receive updates.
    pub trainable: Vec<String>,
}

impl OptimizerSpec {
    pub const WEIGHT_DECAY: f64 = 3e-4;

    pub fn adam(config: &DatasetConfig, state: &ModelState) -> Self {
        Self {
            kind: "adam".to_string(),
            lr: config.lr,
            betas: (config.beta1, config.beta2),
            weight_decay: Self::WEIGHT_DECAY,
            trainable: state.trainable_keys(),
        }
    }
}
