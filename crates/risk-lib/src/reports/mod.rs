//! Monitoring reports
//!
//! Every report compares a window of current data against the reference data
//! the model was validated on. Both sides are [`ReportFrame`]s: transformed
//! model features plus the true label (when known) and the predicted label.
//! Reports are written as pretty-printed JSON and the written path is
//! returned.

mod drift;
mod performance;
mod quality;
pub mod stats;

pub use drift::{
    build_data_drift_report, build_target_drift_report, DataDrift, FeatureDrift, LabelDrift,
    TargetDrift, CATEGORICAL_DRIFT_THRESHOLD, DATASET_DRIFT_SHARE,
};
pub use performance::{build_model_performance_report, ModelPerformance, PerformanceSnapshot};
pub use quality::{build_data_quality_report, ColumnSummary, DataQuality};

use crate::pipeline::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("report requires column '{0}' which is not available")]
    MissingColumn(String),
}

/// Which report to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    ModelPerformance,
    TargetDrift,
    DataDrift,
    DataQuality,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::ModelPerformance,
        ReportKind::TargetDrift,
        ReportKind::DataDrift,
        ReportKind::DataQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::ModelPerformance => "model_performance",
            ReportKind::TargetDrift => "target_drift",
            ReportKind::DataDrift => "data_drift",
            ReportKind::DataQuality => "data_quality",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model features of a data window with true and predicted labels
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFrame {
    pub features: Frame,
    pub target: Option<Vec<String>>,
    pub prediction: Vec<String>,
}

impl ReportFrame {
    pub fn rows(&self) -> usize {
        self.features.rows()
    }

    pub(crate) fn require_target(&self, mapping: &ColumnMapping) -> Result<&[String], ReportError> {
        self.target
            .as_deref()
            .ok_or_else(|| ReportError::MissingColumn(mapping.target.clone()))
    }
}

/// Roles of the columns a report reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub target: String,
    pub prediction: String,
    pub numerical_features: Vec<String>,
    pub categorical_features: Vec<String>,
}

impl ColumnMapping {
    /// Split features by column type
    pub fn from_frame(frame: &Frame, target: &str, prediction: &str) -> Self {
        Self {
            target: target.to_string(),
            prediction: prediction.to_string(),
            numerical_features: frame.numeric_columns(),
            categorical_features: frame.categorical_columns(),
        }
    }
}

/// Envelope shared by all reports
#[derive(Debug, Clone, Serialize)]
pub struct Report<T> {
    pub report: ReportKind,
    pub generated_at: DateTime<Utc>,
    pub reference_rows: usize,
    pub current_rows: usize,
    pub column_mapping: ColumnMapping,
    pub metrics: T,
}

pub(crate) fn write_report<T: Serialize>(
    path: &Path,
    kind: ReportKind,
    current: &ReportFrame,
    reference: &ReportFrame,
    mapping: &ColumnMapping,
    metrics: T,
) -> Result<PathBuf, ReportError> {
    let report = Report {
        report: kind,
        generated_at: Utc::now(),
        reference_rows: reference.rows(),
        current_rows: current.rows(),
        column_mapping: mapping.clone(),
        metrics,
    };
    let body = serde_json::to_vec_pretty(&report)?;

    let io_error = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, body).map_err(io_error)?;

    info!(
        report = %kind,
        path = %path.display(),
        current_rows = current.rows(),
        reference_rows = reference.rows(),
        "Report written"
    );
    Ok(path.to_path_buf())
}

/// Build any report kind
pub fn build_report(
    kind: ReportKind,
    current: &ReportFrame,
    reference: &ReportFrame,
    mapping: &ColumnMapping,
    path: &Path,
) -> Result<PathBuf, ReportError> {
    match kind {
        ReportKind::ModelPerformance => {
            build_model_performance_report(current, reference, mapping, path)
        }
        ReportKind::TargetDrift => build_target_drift_report(current, reference, mapping, path),
        ReportKind::DataDrift => build_data_drift_report(current, reference, mapping, path),
        ReportKind::DataQuality => build_data_quality_report(current, reference, mapping, path),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::pipeline::Column;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    /// A frame with one continuous and one indicator feature
    pub fn frame(bmi: &[f64], target: Option<&[&str]>, prediction: &[&str]) -> ReportFrame {
        let mut features = Frame::with_rows(bmi.len());
        features.insert("BMI", Column::Numeric(bmi.to_vec()));
        let indicator = bmi.iter().map(|b| if *b > 0.0 { 1.0 } else { 0.0 }).collect();
        features.insert("Gender_Female", Column::Numeric(indicator));
        ReportFrame {
            features,
            target: target.map(labels),
            prediction: labels(prediction),
        }
    }

    pub fn mapping(frame: &ReportFrame) -> ColumnMapping {
        ColumnMapping::from_frame(&frame.features, "NObeyesdad", "prediction")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{frame, mapping};
    use super::*;
    use crate::pipeline::Column;
    use tempfile::TempDir;

    #[test]
    fn test_mapping_splits_by_column_type() {
        let mut features = Frame::with_rows(1);
        features.insert("BMI", Column::Numeric(vec![1.0]));
        features.insert("Age", Column::Categorical(vec!["q1".to_string()]));
        let mapping = ColumnMapping::from_frame(&features, "NObeyesdad", "prediction");
        assert_eq!(mapping.numerical_features, vec!["BMI"]);
        assert_eq!(mapping.categorical_features, vec!["Age"]);
    }

    #[test]
    fn test_every_kind_writes_json_and_returns_path() {
        let dir = TempDir::new().unwrap();
        let reference = frame(&[0.1, 0.2, -0.3], Some(&["a", "b", "a"][..]), &["a", "b", "b"]);
        let current = frame(&[0.4, -0.5], Some(&["a", "a"][..]), &["a", "b"]);
        let mapping = mapping(&reference);

        for kind in ReportKind::ALL {
            let path = dir.path().join("nested").join(format!("{}.json", kind));
            let written = build_report(kind, &current, &reference, &mapping, &path).unwrap();
            assert_eq!(written, path);

            let body: serde_json::Value =
                serde_json::from_slice(&std::fs::read(&written).unwrap()).unwrap();
            assert_eq!(body["report"], kind.as_str());
            assert_eq!(body["current_rows"], 2);
            assert_eq!(body["reference_rows"], 3);
        }
    }
}
