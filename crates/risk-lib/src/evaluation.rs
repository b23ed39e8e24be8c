//! Classification metrics
//!
//! Labels are the sorted union of observed truth and predictions. A ratio
//! with a zero denominator counts as 0, and weighted averages weight each
//! class by its support in the truth.

use serde::Serialize;
use std::collections::BTreeSet;

/// Scores for one class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics<T> {
    pub label: T,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Complete evaluation of one set of predictions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSummary<T> {
    pub labels: Vec<T>,
    /// Rows are true labels, columns predicted labels, both in `labels` order
    pub confusion_matrix: Vec<Vec<usize>>,
    pub classes: Vec<ClassMetrics<T>>,
    pub accuracy: f64,
    pub weighted_f1: f64,
}

/// Sorted union of the labels present in either slice
pub fn observed_labels<T: Ord + Clone>(truth: &[T], predicted: &[T]) -> Vec<T> {
    truth
        .iter()
        .chain(predicted)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn confusion_matrix<T: Ord>(truth: &[T], predicted: &[T], labels: &[T]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; labels.len()]; labels.len()];
    for (t, p) in truth.iter().zip(predicted) {
        if let (Ok(i), Ok(j)) = (labels.binary_search(t), labels.binary_search(p)) {
            matrix[i][j] += 1;
        }
    }
    matrix
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn accuracy<T: PartialEq>(truth: &[T], predicted: &[T]) -> f64 {
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    ratio(correct, truth.len().min(predicted.len()))
}

pub fn evaluate<T: Ord + Clone>(truth: &[T], predicted: &[T]) -> ClassificationSummary<T> {
    let labels = observed_labels(truth, predicted);
    let matrix = confusion_matrix(truth, predicted, &labels);

    let classes: Vec<ClassMetrics<T>> = labels
        .iter()
        .enumerate()
        .map(|(k, label)| {
            let tp = matrix[k][k];
            let support: usize = matrix[k].iter().sum();
            let predicted_k: usize = matrix.iter().map(|row| row[k]).sum();
            let precision = ratio(tp, predicted_k);
            let recall = ratio(tp, support);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            ClassMetrics {
                label: label.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    let total: usize = classes.iter().map(|c| c.support).sum();
    let weighted_f1 = if total == 0 {
        0.0
    } else {
        classes
            .iter()
            .map(|c| c.f1 * c.support as f64)
            .sum::<f64>()
            / total as f64
    };

    ClassificationSummary {
        accuracy: accuracy(truth, predicted),
        labels,
        confusion_matrix: matrix,
        classes,
        weighted_f1,
    }
}

/// Support-weighted F1 over all observed labels
pub fn weighted_f1<T: Ord + Clone>(truth: &[T], predicted: &[T]) -> f64 {
    evaluate(truth, predicted).weighted_f1
}
