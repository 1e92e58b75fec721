//! Classification report emitted after evaluation.

use crate::backend::EvaluationReport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "classification_report.json";

/// Per-class and macro-averaged classification metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    /// Rows are true labels, columns predicted labels.
    pub confusion_matrix: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: u32,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ClassificationMetrics {
    /// Compute metrics over paired predictions and labels. Classes are
    /// `0..num_classes`, widened to cover any label seen in either sequence.
    pub fn from_predictions(predictions: &[u32], labels: &[u32], num_classes: usize) -> Self {
        let n = predictions.len().min(labels.len());
        let classes = predictions[..n]
            .iter()
            .chain(&labels[..n])
            .map(|&c| c as usize + 1)
            .max()
            .unwrap_or(0)
            .max(num_classes);

        let mut confusion = vec![vec![0usize; classes]; classes];
        for (&p, &t) in predictions[..n].iter().zip(&labels[..n]) {
            confusion[t as usize][p as usize] += 1;
        }

        let correct: usize = (0..classes).map(|c| confusion[c][c]).sum();
        let per_class: Vec<ClassMetrics> = (0..classes)
            .map(|c| {
                let tp = confusion[c][c] as f64;
                let support: usize = confusion[c].iter().sum();
                let predicted: usize = confusion.iter().map(|row| row[c]).sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                ClassMetrics {
                    label: c as u32,
                    precision,
                    recall,
                    f1_score: ratio(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect();

        let mean = |f: fn(&ClassMetrics) -> f64| {
            ratio(per_class.iter().map(f).sum(), per_class.len() as f64)
        };
        Self {
            accuracy: ratio(correct as f64, n as f64),
            macro_precision: mean(|m| m.precision),
            macro_recall: mean(|m| m.recall),
            macro_f1: mean(|m| m.f1_score),
            per_class,
            confusion_matrix: confusion,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

/// What is written next to the stage's checkpoint after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub loss: f64,
    /// Accuracy as reported by the evaluator.
    pub evaluator_accuracy: f64,
    pub metrics: ClassificationMetrics,
}

impl ClassificationReport {
    pub fn new(report: &EvaluationReport, num_classes: usize) -> Self {
        Self {
            loss: report.loss,
            evaluator_accuracy: report.accuracy,
            metrics: ClassificationMetrics::from_predictions(
                &report.predictions,
                &report.labels,
                num_classes,
            ),
        }
    }

    /// Write `<stage_dir>/classification_report.json`.
    pub fn save(&self, stage_dir: &Path) -> std::io::Result<PathBuf> {
        let path = stage_dir.join(REPORT_FILE);
        tstcc_core::atomic_write_json(&path, self)?;
        Ok(path)
    }
}
