use std::fmt;

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::forest::CLASS_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub total: usize,
}

pub fn accuracy(predictions: &[u8], labels: &[u8]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels.iter())
        .filter(|(pred, label)| pred == label)
        .count();
    correct as f64 / labels.len() as f64
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

pub fn classification_report(predictions: &[u8], labels: &[u8]) -> Result<ClassificationReport> {
    if predictions.len() != labels.len() {
        return Err(PipelineError::invalid_input(format!(
            "{} predictions for {} labels",
            predictions.len(),
            labels.len()
        )));
    }

    let classes: Vec<ClassMetrics> = (0..CLASS_COUNT as u8)
        .map(|class| {
            let mut tp = 0;
            let mut fp = 0;
            let mut fn_count = 0;
            for (&pred, &label) in predictions.iter().zip(labels.iter()) {
                match (pred == class, label == class) {
                    (true, true) => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fn_count += 1,
                    (false, false) => {}
                }
            }

            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + fn_count);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassMetrics {
                label: class,
                precision,
                recall,
                f1,
                support: tp + fn_count,
            }
        })
        .collect();

    let total = labels.len();
    let n_classes = classes.len() as f64;
    let macro_avg = AveragedMetrics {
        precision: classes.iter().map(|c| c.precision).sum::<f64>() / n_classes,
        recall: classes.iter().map(|c| c.recall).sum::<f64>() / n_classes,
        f1: classes.iter().map(|c| c.f1).sum::<f64>() / n_classes,
    };
    let weight = |value: fn(&ClassMetrics) -> f64| {
        if total == 0 {
            0.0
        } else {
            classes
                .iter()
                .map(|c| value(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        }
    };
    let weighted_avg = AveragedMetrics {
        precision: weight(|c| c.precision),
        recall: weight(|c| c.recall),
        f1: weight(|c| c.f1),
    };

    Ok(ClassificationReport {
        accuracy: accuracy(predictions, labels),
        classes,
        macro_avg,
        weighted_avg,
        total,
    })
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}
