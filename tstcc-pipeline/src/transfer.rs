//! Parameter transfer: merging a predecessor's parameters into a fresh model
//! and deciding which keys stay frozen afterwards.
//!
//! Everything here is a pure transform over [`ParameterMapping`]s. The merge
//! never introduces a key the target did not declare, never copies a key that
//! matches the exclusion policy, and refuses to coerce a value whose shape
//! differs from the target's.

use crate::error::StageError;
use crate::mode::TrainingMode;
use crate::tensor::ParameterMapping;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Key pattern of the final classification layer.
pub const CLASSIFIER_PATTERN: &str = "logits";

/// Key substrings that must never be copied from a source checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionPolicy {
    patterns: Vec<String>,
}

impl ExclusionPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Excludes the final classification layer.
    pub fn classifier() -> Self {
        Self::new([CLASSIFIER_PATTERN])
    }

    /// This policy plus the classifier pattern.
    pub fn with_classifier(mut self) -> Self {
        if !self.patterns.iter().any(|p| p == CLASSIFIER_PATTERN) {
            self.patterns.push(CLASSIFIER_PATTERN.to_string());
        }
        self
    }

    pub fn matches(&self, key: &str) -> bool {
        self.patterns.iter().any(|p| key.contains(p.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Parameter keys the downstream optimizer must not update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreezePolicy(BTreeSet<String>);

impl FreezePolicy {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Freeze exactly what was transferred; only freshly initialized keys train.
    pub fn transferred(transferred: &BTreeSet<String>) -> Self {
        Self(transferred.clone())
    }

    /// Freeze every key of `mapping` except the ones `exclusion` matches.
    pub fn all_except(mapping: &ParameterMapping, exclusion: &ExclusionPolicy) -> Self {
        Self(
            mapping
                .keys()
                .filter(|k| !exclusion.matches(k))
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn keys(&self) -> &BTreeSet<String> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which keys to freeze after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeRule {
    /// Linear probe: freeze everything that was transferred.
    Transferred,
    /// Fine-tuning: everything stays trainable.
    Nothing,
}

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: ParameterMapping,
    pub transferred: BTreeSet<String>,
}

/// Overwrite every target key that the source also has and the policy does not
/// exclude. Target-only keys keep their initialized value; source-only keys are
/// dropped.
pub fn merge(
    source: &ParameterMapping,
    target: &ParameterMapping,
    exclusion: &ExclusionPolicy,
) -> Result<MergeOutcome, StageError> {
    let mut merged = ParameterMapping::new();
    let mut transferred = BTreeSet::new();

    for (key, initial) in target {
        let incoming = match source.get(key) {
            Some(value) if !exclusion.matches(key) => value,
            _ => {
                merged.insert(key.clone(), initial.clone());
                continue;
            }
        };
        if incoming.shape != initial.shape {
            return Err(StageError::ShapeMismatch {
                key: key.clone(),
                expected: initial.shape.clone(),
                found: incoming.shape.clone(),
            });
        }
        merged.insert(key.clone(), incoming.clone());
        transferred.insert(key.clone());
    }

    Ok(MergeOutcome {
        merged,
        transferred,
    })
}

/// Freeze set for a completed merge.
pub fn freeze_set(rule: FreezeRule, transferred: &BTreeSet<String>) -> FreezePolicy {
    match rule {
        FreezeRule::Transferred => FreezePolicy::transferred(transferred),
        FreezeRule::Nothing => FreezePolicy::empty(),
    }
}

/// Wholesale load: source and target must declare exactly the same keys with
/// the same shapes. Returns the source values in target key order.
pub fn load_strict(
    source: &ParameterMapping,
    target: &ParameterMapping,
) -> Result<ParameterMapping, LoadMismatch> {
    let missing: Vec<String> = target
        .keys()
        .filter(|k| !source.contains_key(k))
        .map(str::to_string)
        .collect();
    let unexpected: Vec<String> = source
        .keys()
        .filter(|k| !target.contains_key(k))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(LoadMismatch::Keys {
            missing,
            unexpected,
        });
    }

    for (key, initial) in target {
        if let Some(incoming) = source.get(key) {
            if incoming.shape != initial.shape {
                return Err(LoadMismatch::Shape(StageError::ShapeMismatch {
                    key: key.clone(),
                    expected: initial.shape.clone(),
                    found: incoming.shape.clone(),
                }));
            }
        }
    }

    Ok(source.clone())
}

/// Why a wholesale load was rejected.
#[derive(Debug)]
pub enum LoadMismatch {
    Keys {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    Shape(StageError),
}

impl LoadMismatch {
    /// Attach the offending artifact's location.
    pub fn into_stage_error(self, path: &std::path::Path) -> StageError {
        match self {
            Self::Keys {
                missing,
                unexpected,
            } => StageError::malformed(
                path,
                format!("missing keys {missing:?}, unexpected keys {unexpected:?}"),
            ),
            Self::Shape(err) => err,
        }
    }
}

/// How a mode prepares its freshly constructed model.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPlan {
    /// Start from the fresh initialization.
    Fresh,
    /// Shape-compatible merge from the predecessor, then freeze per rule.
    Merge {
        exclusion: ExclusionPolicy,
        freeze: FreezeRule,
    },
    /// Predecessor and target share one architecture; load everything.
    Wholesale,
    /// No predecessor; freeze everything outside the excluded layer.
    FreezeAllExcept { exclusion: ExclusionPolicy },
}

impl TransferPlan {
    pub fn for_mode(mode: &TrainingMode, exclusion: &ExclusionPolicy) -> Self {
        match mode {
            TrainingMode::FineTune(_) => Self::Merge {
                exclusion: exclusion.clone(),
                freeze: FreezeRule::Nothing,
            },
            TrainingMode::TrainLinear(_) => Self::Merge {
                exclusion: exclusion.clone(),
                freeze: FreezeRule::Transferred,
            },
            TrainingMode::SupCon | TrainingMode::GenPseudoLabels => Self::Wholesale,
            TrainingMode::RandomInit => Self::FreezeAllExcept {
                exclusion: exclusion.clone(),
            },
            TrainingMode::Supervised
            | TrainingMode::SelfSupervised
            | TrainingMode::SupConPseudo => Self::Fresh,
        }
    }

    pub fn needs_checkpoint(&self) -> bool {
        matches!(self, Self::Merge { .. } | Self::Wholesale)
    }
}
