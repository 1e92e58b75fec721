//! Training modes: the closed set of pipeline stages.
//!
//! A mode's string form is part of the on-disk layout (`<mode>_seed_<seed>`),
//! so parsing and display round-trip exactly for every accepted spelling.

use crate::error::StageError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Percentage of the labelled training split a downstream stage uses (`1p`, `5p`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataFraction(u8);

impl DataFraction {
    pub const ONE_PERCENT: Self = Self(1);

    /// `percent` must lie in `1..=100`.
    pub fn new(percent: u8) -> Option<Self> {
        (1..=100).contains(&percent).then_some(Self(percent))
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl Default for DataFraction {
    fn default() -> Self {
        Self::ONE_PERCENT
    }
}

impl fmt::Display for DataFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.0)
    }
}

impl FromStr for DataFraction {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StageError::InvalidMode(format!("invalid data fraction '{s}'"));
        let digits = s.strip_suffix('p').ok_or_else(invalid)?;
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        digits
            .parse::<u8>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(invalid)
    }
}

/// Which representation stage a downstream mode builds on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pretext {
    SelfSupervised,
    SupCon,
}

/// Long (`fine_tune`, `train_linear`) or short (`ft`, `tl`) mode prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spelling {
    Long,
    Short,
}

/// Parameters shared by the fine-tuning and linear-probe families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Downstream {
    pub spelling: Spelling,
    pub pretext: Pretext,
    pub fraction: Option<DataFraction>,
}

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainingMode {
    Supervised,
    SelfSupervised,
    SupCon,
    SupConPseudo,
    RandomInit,
    GenPseudoLabels,
    FineTune(Downstream),
    TrainLinear(Downstream),
}

impl TrainingMode {
    /// `ft_<fraction>` on top of the self-supervised representation.
    pub fn fine_tune_at(fraction: DataFraction) -> Self {
        Self::FineTune(Downstream {
            spelling: Spelling::Short,
            pretext: Pretext::SelfSupervised,
            fraction: Some(fraction),
        })
    }

    pub fn fraction(&self) -> Option<DataFraction> {
        match self {
            Self::FineTune(d) | Self::TrainLinear(d) => d.fraction,
            _ => None,
        }
    }

    /// Stages whose only product is a representation, not a classifier.
    pub fn learns_representation(&self) -> bool {
        matches!(self, Self::SelfSupervised | Self::SupCon | Self::SupConPseudo)
    }

    /// Whether evaluation and metric emission follow training.
    pub fn evaluates(&self) -> bool {
        !self.learns_representation() && !matches!(self, Self::GenPseudoLabels)
    }

    /// Stages that record the dataset configuration at the run root.
    pub fn snapshots_config(&self) -> bool {
        matches!(self, Self::SelfSupervised | Self::SupCon)
    }

    /// Stages trained on the pseudo-labelled split.
    pub fn uses_pseudo_labels(&self) -> bool {
        matches!(self, Self::SupCon | Self::SupConPseudo)
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (d, long, short) = match self {
            Self::Supervised => return f.write_str("supervised"),
            Self::SelfSupervised => return f.write_str("self_supervised"),
            Self::SupCon => return f.write_str("SupCon"),
            Self::SupConPseudo => return f.write_str("SupCon_pseudo"),
            Self::RandomInit => return f.write_str("random_init"),
            Self::GenPseudoLabels => return f.write_str("gen_pseudo_labels"),
            Self::FineTune(d) => (d, "fine_tune", "ft"),
            Self::TrainLinear(d) => (d, "train_linear", "tl"),
        };

        f.write_str(match d.spelling {
            Spelling::Long => long,
            Spelling::Short => short,
        })?;
        if d.pretext == Pretext::SupCon {
            f.write_str("_SupCon")?;
        }
        if let Some(fraction) = d.fraction {
            write!(f, "_{fraction}")?;
        }
        Ok(())
    }
}

impl FromStr for TrainingMode {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fixed = match s {
            "supervised" => Some(Self::Supervised),
            "self_supervised" => Some(Self::SelfSupervised),
            "SupCon" => Some(Self::SupCon),
            "SupCon_pseudo" => Some(Self::SupConPseudo),
            "random_init" => Some(Self::RandomInit),
            "gen_pseudo_labels" => Some(Self::GenPseudoLabels),
            _ => None,
        };
        fixed
            .or_else(|| parse_downstream(s))
            .ok_or_else(|| StageError::InvalidMode(s.to_string()))
    }
}

fn parse_downstream(s: &str) -> Option<TrainingMode> {
    let (fine_tune, spelling, rest) = if let Some(rest) = s.strip_prefix("fine_tune") {
        (true, Spelling::Long, rest)
    } else if let Some(rest) = s.strip_prefix("train_linear") {
        (false, Spelling::Long, rest)
    } else if let Some(rest) = s.strip_prefix("ft") {
        (true, Spelling::Short, rest)
    } else if let Some(rest) = s.strip_prefix("tl") {
        (false, Spelling::Short, rest)
    } else {
        return None;
    };

    let mut tokens = match rest {
        "" => Vec::new(),
        _ => rest.strip_prefix('_')?.split('_').collect(),
    }
    .into_iter()
    .peekable();

    let pretext = if tokens.next_if_eq(&"SupCon").is_some() {
        Pretext::SupCon
    } else {
        Pretext::SelfSupervised
    };
    let fraction = match tokens.next() {
        Some(tok) => Some(tok.parse::<DataFraction>().ok()?),
        None => None,
    };
    if tokens.next().is_some() {
        return None;
    }
    // A bare `ft` / `tl` names nothing.
    if spelling == Spelling::Short && pretext == Pretext::SelfSupervised && fraction.is_none() {
        return None;
    }

    let d = Downstream {
        spelling,
        pretext,
        fraction,
    };
    Some(if fine_tune {
        TrainingMode::FineTune(d)
    } else {
        TrainingMode::TrainLinear(d)
    })
}

impl Serialize for TrainingMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TrainingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for DataFraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataFraction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEPTED: &[&str] = &[
        "supervised",
        "self_supervised",
        "SupCon",
        "SupCon_pseudo",
        "random_init",
        "gen_pseudo_labels",
        "fine_tune",
        "fine_tune_5p",
        "fine_tune_SupCon",
        "fine_tune_SupCon_10p",
        "ft_1p",
        "ft_75p",
        "ft_SupCon",
        "ft_SupCon_1p",
        "train_linear",
        "train_linear_SupCon",
        "train_linear_SupCon_1p",
        "tl_1p",
        "tl_SupCon_50p",
    ];

    #[test]
    fn test_accepted_modes_roundtrip() {
        for s in ACCEPTED {
            let mode: TrainingMode = s.parse().unwrap();
            assert_eq!(mode.to_string(), *s);
        }
    }

    #[test]
    fn test_rejected_modes() {
        for s in [
            "",
            "ft",
            "tl",
            "ft_",
            "ft_0p",
            "ft_01p",
            "ft_101p",
            "ft_1p_SupCon",
            "fine_tune_1p_extra",
            "finetune",
            "supcon",
            "SupCon_1p",
        ] {
            assert!(s.parse::<TrainingMode>().is_err(), "accepted '{s}'");
        }
    }

    #[test]
    fn test_downstream_fields() {
        let mode: TrainingMode = "tl_SupCon_5p".parse().unwrap();
        assert_eq!(
            mode,
            TrainingMode::TrainLinear(Downstream {
                spelling: Spelling::Short,
                pretext: Pretext::SupCon,
                fraction: DataFraction::new(5),
            })
        );
        assert_eq!(mode.fraction(), DataFraction::new(5));
    }

    #[test]
    fn test_fine_tune_at_matches_short_spelling() {
        let mode = TrainingMode::fine_tune_at(DataFraction::ONE_PERCENT);
        assert_eq!(mode.to_string(), "ft_1p");
        assert_eq!("ft_1p".parse::<TrainingMode>().unwrap(), mode);
    }

    #[test]
    fn test_evaluation_flags() {
        for s in ["self_supervised", "SupCon", "SupCon_pseudo", "gen_pseudo_labels"] {
            assert!(!s.parse::<TrainingMode>().unwrap().evaluates(), "{s}");
        }
        for s in ["supervised", "random_init", "ft_1p", "train_linear"] {
            assert!(s.parse::<TrainingMode>().unwrap().evaluates(), "{s}");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let mode: TrainingMode = "ft_SupCon_1p".parse().unwrap();
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, "\"ft_SupCon_1p\"");
        let back: TrainingMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mode);
        assert!(serde_json::from_str::<TrainingMode>("\"bogus\"").is_err());
    }
}
