use super::{write_report, ColumnMapping, ReportError, ReportFrame, ReportKind};
use crate::evaluation::{evaluate, ClassificationSummary};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Classification quality of one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub quality: ClassificationSummary<String>,
    /// Row count per true class
    pub class_balance: BTreeMap<String, usize>,
}

impl PerformanceSnapshot {
    fn compute(frame: &ReportFrame, mapping: &ColumnMapping) -> Result<Self, ReportError> {
        let truth = frame.require_target(mapping)?;
        let mut class_balance = BTreeMap::new();
        for label in truth {
            *class_balance.entry(label.clone()).or_insert(0) += 1;
        }
        Ok(Self {
            quality: evaluate(truth, &frame.prediction),
            class_balance,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPerformance {
    pub reference: PerformanceSnapshot,
    pub current: PerformanceSnapshot,
    /// Current minus reference weighted F1
    pub weighted_f1_delta: f64,
}

pub fn build_model_performance_report(
    current: &ReportFrame,
    reference: &ReportFrame,
    mapping: &ColumnMapping,
    path: &Path,
) -> Result<PathBuf, ReportError> {
    let reference_snapshot = PerformanceSnapshot::compute(reference, mapping)?;
    let current_snapshot = PerformanceSnapshot::compute(current, mapping)?;
    let metrics = ModelPerformance {
        weighted_f1_delta: current_snapshot.quality.weighted_f1
            - reference_snapshot.quality.weighted_f1,
        reference: reference_snapshot,
        current: current_snapshot,
    };
    write_report(path, ReportKind::ModelPerformance, current, reference, mapping, metrics)
}
