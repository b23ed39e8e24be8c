//! Data quality summaries

use super::stats::{mean, pearson, quantile, sorted, std_dev};
use super::{write_report, ColumnMapping, ReportError, ReportFrame, ReportKind};
use crate::pipeline::Column;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-column statistics of one window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnSummary {
    Numerical {
        count: usize,
        missing: usize,
        mean: Option<f64>,
        std: Option<f64>,
        min: Option<f64>,
        p25: Option<f64>,
        p50: Option<f64>,
        p75: Option<f64>,
        max: Option<f64>,
    },
    Categorical {
        count: usize,
        missing: usize,
        unique: usize,
        most_common: Option<String>,
    },
}

impl ColumnSummary {
    pub fn of(column: &Column) -> Self {
        match column {
            Column::Numeric(values) => {
                let present = sorted(values);
                ColumnSummary::Numerical {
                    count: present.len(),
                    missing: values.len() - present.len(),
                    mean: mean(&present),
                    std: std_dev(&present),
                    min: present.first().copied(),
                    p25: quantile(&present, 0.25),
                    p50: quantile(&present, 0.5),
                    p75: quantile(&present, 0.75),
                    max: present.last().copied(),
                }
            }
            Column::Categorical(values) => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                let mut missing = 0;
                for value in values {
                    if value.is_empty() {
                        missing += 1;
                    } else {
                        *counts.entry(value.as_str()).or_default() += 1;
                    }
                }
                // ties go to the lexicographically first value
                let most_common = counts
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(value, _)| value.to_string());
                ColumnSummary::Categorical {
                    count: values.len() - missing,
                    missing,
                    unique: counts.len(),
                    most_common,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub reference: BTreeMap<String, ColumnSummary>,
    pub current: BTreeMap<String, ColumnSummary>,
    /// Pearson correlations between numerical features of the current window
    pub correlations: BTreeMap<String, BTreeMap<String, Option<f64>>>,
}

impl DataQuality {
    pub fn compute(current: &ReportFrame, reference: &ReportFrame, mapping: &ColumnMapping) -> Self {
        let summarize = |frame: &ReportFrame| -> BTreeMap<String, ColumnSummary> {
            mapping
                .numerical_features
                .iter()
                .chain(&mapping.categorical_features)
                .filter_map(|name| {
                    frame
                        .features
                        .get(name)
                        .map(|column| (name.clone(), ColumnSummary::of(column)))
                })
                .collect()
        };

        let mut correlations = BTreeMap::new();
        for a in &mapping.numerical_features {
            let Some(x) = current.features.numeric(a) else {
                continue;
            };
            let mut row = BTreeMap::new();
            for b in &mapping.numerical_features {
                if let Some(y) = current.features.numeric(b) {
                    row.insert(b.clone(), pearson(x, y));
                }
            }
            correlations.insert(a.clone(), row);
        }

        Self {
            reference: summarize(reference),
            current: summarize(current),
            correlations,
        }
    }
}

pub fn build_data_quality_report(
    current: &ReportFrame,
    reference: &ReportFrame,
    mapping: &ColumnMapping,
    path: &Path,
) -> Result<PathBuf, ReportError> {
    let metrics = DataQuality::compute(current, reference, mapping);
    write_report(path, ReportKind::DataQuality, current, reference, mapping, metrics)
}
