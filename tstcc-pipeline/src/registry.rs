//! Dataset configuration registry.
//!
//! Built once at startup and handed to the orchestrator by reference. There is
//! no process-wide instance; registration ends when [`ConfigRegistryBuilder::build`]
//! returns.

use crate::datasets::DatasetConfig;
use crate::error::StageError;
use std::collections::BTreeMap;
use std::fmt;

/// Zero-argument constructor for a dataset's configuration.
pub type ConfigFactory = Box<dyn Fn() -> DatasetConfig + Send + Sync>;

/// Immutable map from dataset identifier to configuration factory.
pub struct ConfigRegistry {
    builders: BTreeMap<String, ConfigFactory>,
}

impl ConfigRegistry {
    pub fn builder() -> ConfigRegistryBuilder {
        ConfigRegistryBuilder::default()
    }

    /// Registry with the four datasets shipped with tstcc.
    pub fn builtin() -> Self {
        Self::builder()
            .register("Epilepsy", DatasetConfig::epilepsy)
            .register("HAR", DatasetConfig::har)
            .register("pFD", DatasetConfig::fault_diagnosis)
            .register("EEG", DatasetConfig::sleep_edf)
            .build()
    }

    /// Construct a fresh configuration for `name`.
    pub fn create(&self, name: &str) -> Result<DatasetConfig, StageError> {
        self.builders
            .get(name)
            .map(|build| build())
            .ok_or_else(|| StageError::UnknownDataset {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<String> {
        self.builders.keys().cloned().collect()
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("datasets", &self.names())
            .finish()
    }
}

/// Collects registrations before the registry is frozen.
#[derive(Default)]
pub struct ConfigRegistryBuilder {
    builders: BTreeMap<String, ConfigFactory>,
}

impl ConfigRegistryBuilder {
    /// Associate `name` with `factory`. A later registration under the same
    /// name replaces the earlier one.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> DatasetConfig + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(factory));
        self
    }

    pub fn build(self) -> ConfigRegistry {
        ConfigRegistry {
            builders: self.builders,
        }
    }
}
