//! Target and feature drift

use super::stats::{distribution, jensen_shannon_distance, ks_critical_value, ks_statistic};
use super::{write_report, ColumnMapping, ReportError, ReportFrame, ReportKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Jensen-Shannon distance above which a categorical column has drifted
pub const CATEGORICAL_DRIFT_THRESHOLD: f64 = 0.1;

/// Share of drifted features at which the whole dataset counts as drifted
pub const DATASET_DRIFT_SHARE: f64 = 0.5;

/// Distribution shift of a label column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelDrift {
    pub column: String,
    pub reference_distribution: BTreeMap<String, f64>,
    pub current_distribution: BTreeMap<String, f64>,
    pub jensen_shannon_distance: f64,
    pub drift_detected: bool,
}

impl LabelDrift {
    fn compute(column: &str, reference: &[String], current: &[String]) -> Self {
        let reference_distribution = distribution(reference.iter().map(String::as_str));
        let current_distribution = distribution(current.iter().map(String::as_str));
        let distance = jensen_shannon_distance(&reference_distribution, &current_distribution);
        Self {
            column: column.to_string(),
            reference_distribution,
            current_distribution,
            jensen_shannon_distance: distance,
            drift_detected: distance > CATEGORICAL_DRIFT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetDrift {
    /// Absent when either window is unlabelled
    pub target: Option<LabelDrift>,
    pub prediction: LabelDrift,
}

pub fn build_target_drift_report(
    current: &ReportFrame,
    reference: &ReportFrame,
    mapping: &ColumnMapping,
    path: &Path,
) -> Result<PathBuf, ReportError> {
    let target = match (&reference.target, &current.target) {
        (Some(r), Some(c)) => Some(LabelDrift::compute(&mapping.target, r, c)),
        _ => None,
    };
    let metrics = TargetDrift {
        target,
        prediction: LabelDrift::compute(
            &mapping.prediction,
            &reference.prediction,
            &current.prediction,
        ),
    };
    write_report(path, ReportKind::TargetDrift, current, reference, mapping, metrics)
}

/// Drift test result for one feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDrift {
    pub column: String,
    /// `ks` for numerical features, `jensen_shannon` for categorical ones
    pub test: &'static str,
    pub statistic: f64,
    pub threshold: f64,
    pub drift_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataDrift {
    pub features: Vec<FeatureDrift>,
    pub drifted_features: usize,
    pub share_of_drifted_features: f64,
    pub dataset_drift: bool,
}

impl DataDrift {
    pub fn compute(
        current: &ReportFrame,
        reference: &ReportFrame,
        mapping: &ColumnMapping,
    ) -> Result<Self, ReportError> {
        let mut features = Vec::new();

        for column in &mapping.numerical_features {
            let (r, c) = numeric_pair(column, reference, current)?;
            let statistic = ks_statistic(r, c);
            let threshold = ks_critical_value(r.len(), c.len());
            features.push(FeatureDrift {
                column: column.clone(),
                test: "ks",
                statistic,
                threshold,
                drift_detected: statistic > threshold,
            });
        }

        for column in &mapping.categorical_features {
            let (r, c) = categorical_pair(column, reference, current)?;
            let statistic = jensen_shannon_distance(
                &distribution(r.iter().map(String::as_str)),
                &distribution(c.iter().map(String::as_str)),
            );
            features.push(FeatureDrift {
                column: column.clone(),
                test: "jensen_shannon",
                statistic,
                threshold: CATEGORICAL_DRIFT_THRESHOLD,
                drift_detected: statistic > CATEGORICAL_DRIFT_THRESHOLD,
            });
        }

        let drifted_features = features.iter().filter(|f| f.drift_detected).count();
        let share = if features.is_empty() {
            0.0
        } else {
            drifted_features as f64 / features.len() as f64
        };
        Ok(Self {
            dataset_drift: !features.is_empty() && share >= DATASET_DRIFT_SHARE,
            features,
            drifted_features,
            share_of_drifted_features: share,
        })
    }
}

fn numeric_pair<'a>(
    column: &str,
    reference: &'a ReportFrame,
    current: &'a ReportFrame,
) -> Result<(&'a [f64], &'a [f64]), ReportError> {
    let missing = || ReportError::MissingColumn(column.to_string());
    Ok((
        reference.features.numeric(column).ok_or_else(missing)?,
        current.features.numeric(column).ok_or_else(missing)?,
    ))
}

fn categorical_pair<'a>(
    column: &str,
    reference: &'a ReportFrame,
    current: &'a ReportFrame,
) -> Result<(&'a [String], &'a [String]), ReportError> {
    let missing = || ReportError::MissingColumn(column.to_string());
    Ok((
        reference.features.categorical(column).ok_or_else(missing)?,
        current.features.categorical(column).ok_or_else(missing)?,
    ))
}

pub fn build_data_drift_report(
    current: &ReportFrame,
    reference: &ReportFrame,
    mapping: &ColumnMapping,
    path: &Path,
) -> Result<PathBuf, ReportError> {
    let metrics = DataDrift::compute(current, reference, mapping)?;
    write_report(path, ReportKind::DataDrift, current, reference, mapping, metrics)
}
