//! Split-file data provider.
//!
//! Expects the dataset directory to hold `train.pt`, `val.pt` and `test.pt`,
//! plus `train_<n>perc.pt` for every data fraction a downstream mode asks for.

use super::{DataProvider, DataSplits};
use crate::artifact::labels::PSEUDO_LABEL_FILE;
use crate::datasets::DatasetConfig;
use crate::error::StageError;
use crate::mode::TrainingMode;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct SplitFileProvider;

impl SplitFileProvider {
    /// File name of the train split for `mode`.
    pub fn train_file(mode: &TrainingMode) -> String {
        if mode.uses_pseudo_labels() {
            return PSEUDO_LABEL_FILE.to_string();
        }
        match mode.fraction() {
            Some(fraction) => format!("train_{}perc.pt", fraction.percent()),
            None => "train.pt".to_string(),
        }
    }
}

impl DataProvider for SplitFileProvider {
    fn splits(
        &self,
        data_root: &Path,
        _config: &DatasetConfig,
        mode: &TrainingMode,
    ) -> Result<DataSplits, StageError> {
        let existing = |name: &str| -> Result<PathBuf, StageError> {
            let path = data_root.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(StageError::MissingData { mode: *mode, path })
            }
        };

        let splits = DataSplits {
            train: existing(&Self::train_file(mode))?,
            valid: existing("val.pt")?,
            test: existing("test.pt")?,
        };
        tracing::debug!(train = %splits.train.display(), "Data splits located");
        Ok(splits)
    }
}
