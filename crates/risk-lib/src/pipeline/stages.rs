//! Ordered transformation stages

use super::features::DerivedFeature;
use super::frame::{Column, Frame};
use super::{PipelineDefinition, PipelineError};
use crate::artifacts::{BinEdges, TransformationArtifacts};
use tracing::trace;

pub(crate) const DERIVED_STAGE: &str = "derived_features";

/// Column holding the binned age
pub const AGE: &str = "Age";

/// Log formula applied to numeric columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogTransform {
    /// `ln(1 + x)`
    Log1p,
    /// `ln(x + epsilon)`
    Epsilon(f64),
}

impl LogTransform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            LogTransform::Log1p => value.ln_1p(),
            LogTransform::Epsilon(eps) => (value + eps).ln(),
        }
    }
}

/// Everything a stage reads besides the frame itself
pub struct StageContext<'a> {
    pub definition: &'a PipelineDefinition,
    pub artifacts: &'a TransformationArtifacts,
    pub features: &'a [String],
}

/// One named step of the transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    UnitNormalization,
    DerivedFeatures,
    ColumnPruning,
    Binning,
    LogTransform,
    Scaling,
    Encoding,
    Selection,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 8] = [
        Stage::UnitNormalization,
        Stage::DerivedFeatures,
        Stage::ColumnPruning,
        Stage::Binning,
        Stage::LogTransform,
        Stage::Scaling,
        Stage::Encoding,
        Stage::Selection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::UnitNormalization => "unit_normalization",
            Stage::DerivedFeatures => DERIVED_STAGE,
            Stage::ColumnPruning => "column_pruning",
            Stage::Binning => "binning",
            Stage::LogTransform => "log_transform",
            Stage::Scaling => "scaling",
            Stage::Encoding => "encoding",
            Stage::Selection => "selection",
        }
    }

    /// Columns that must be present before the stage runs
    pub fn required_columns(&self, definition: &PipelineDefinition) -> Vec<&'static str> {
        match self {
            Stage::UnitNormalization => vec!["Height"],
            Stage::DerivedFeatures => {
                let mut columns = Vec::new();
                for input in definition.derived.iter().flat_map(|d| d.inputs()) {
                    if !columns.contains(input) {
                        columns.push(*input);
                    }
                }
                columns
            }
            Stage::ColumnPruning => definition.dropped.to_vec(),
            Stage::Binning => vec![AGE, definition.flag.column()],
            Stage::LogTransform | Stage::Scaling | Stage::Encoding | Stage::Selection => {
                Vec::new()
            }
        }
    }

    /// Run the stage after checking its declared inputs
    pub fn run(&self, frame: Frame, ctx: &StageContext<'_>) -> Result<Frame, PipelineError> {
        for column in self.required_columns(ctx.definition) {
            if !frame.contains(column) {
                return Err(PipelineError::MissingColumn {
                    stage: self.name(),
                    column: column.to_string(),
                });
            }
        }
        trace!(stage = self.name(), columns = frame.names().len(), "Running stage");

        match self {
            Stage::UnitNormalization => normalize_units(frame),
            Stage::DerivedFeatures => derive(frame, ctx.definition.derived),
            Stage::ColumnPruning => Ok(prune(frame, ctx.definition.dropped)),
            Stage::Binning => bin(frame, &ctx.artifacts.age_bins, ctx.definition.flag),
            Stage::LogTransform => log_transform(frame, ctx.definition),
            Stage::Scaling => scale(frame, ctx.artifacts),
            Stage::Encoding => encode(frame, ctx.artifacts),
            Stage::Selection => select(frame, ctx.features),
        }
    }
}

fn numeric_owned(frame: &Frame, stage: &'static str, name: &str) -> Result<Vec<f64>, PipelineError> {
    frame
        .numeric(name)
        .map(<[f64]>::to_vec)
        .ok_or_else(|| PipelineError::MissingColumn {
            stage,
            column: name.to_string(),
        })
}

fn normalize_units(mut frame: Frame) -> Result<Frame, PipelineError> {
    let height: Vec<f64> = numeric_owned(&frame, "unit_normalization", "Height")?
        .into_iter()
        .map(|h| h * 100.0)
        .collect();
    frame.insert("Height", Column::Numeric(height));
    Ok(frame)
}

fn derive(mut frame: Frame, derived: &[DerivedFeature]) -> Result<Frame, PipelineError> {
    for feature in derived {
        let column = feature.compute(&frame)?;
        frame.insert(feature.column(), column);
    }
    Ok(frame)
}

fn prune(mut frame: Frame, dropped: &[&str]) -> Frame {
    for column in dropped {
        frame.remove(column);
    }
    frame
}

fn bin(mut frame: Frame, edges: &BinEdges, flag: DerivedFeature) -> Result<Frame, PipelineError> {
    let ages = numeric_owned(&frame, "binning", AGE)?;
    let mut labels = Vec::with_capacity(ages.len());
    for value in ages {
        let bucket = edges.bucket(value).ok_or_else(|| PipelineError::OutOfBinRange {
            column: AGE.to_string(),
            value,
        })?;
        labels.push(BinEdges::label(bucket));
    }
    frame.insert(AGE, Column::Categorical(labels));

    let flags = numeric_owned(&frame, "binning", flag.column())?
        .into_iter()
        .map(|v| if v != 0.0 { "1" } else { "0" }.to_string())
        .collect();
    frame.insert(flag.column(), Column::Categorical(flags));
    Ok(frame)
}

fn log_transform(mut frame: Frame, definition: &PipelineDefinition) -> Result<Frame, PipelineError> {
    for name in frame.numeric_columns() {
        if definition.log_exclusions.contains(&name.as_str()) {
            continue;
        }
        let values = numeric_owned(&frame, "log_transform", &name)?;
        let mut transformed = Vec::with_capacity(values.len());
        for (row, value) in values.into_iter().enumerate() {
            let result = definition.log.apply(value);
            if !result.is_finite() {
                return Err(PipelineError::NonFinite { column: name, row });
            }
            transformed.push(result);
        }
        frame.insert(name, Column::Numeric(transformed));
    }
    Ok(frame)
}

fn scale(mut frame: Frame, artifacts: &TransformationArtifacts) -> Result<Frame, PipelineError> {
    for name in frame.numeric_columns() {
        let scaler = artifacts
            .scalers
            .get(&name)
            .copied()
            .ok_or_else(|| PipelineError::MissingScaler(name.clone()))?;
        let scaled = numeric_owned(&frame, "scaling", &name)?
            .into_iter()
            .map(|v| scaler.transform(v))
            .collect();
        frame.insert(name, Column::Numeric(scaled));
    }
    Ok(frame)
}

/// One-hot encode categorical columns. Encoded columns come first, followed by
/// the numeric columns in their existing order.
fn encode(frame: Frame, artifacts: &TransformationArtifacts) -> Result<Frame, PipelineError> {
    let rows = frame.rows();
    let mut encoded = Frame::with_rows(rows);

    for (name, column) in frame.iter() {
        let Column::Categorical(values) = column else {
            continue;
        };
        let encoder = artifacts
            .encoders
            .get(name)
            .ok_or_else(|| PipelineError::MissingEncoder(name.to_string()))?;

        let width = encoder.categories().len();
        let mut indicators = vec![vec![0.0; rows]; width];
        for (row, value) in values.iter().enumerate() {
            let idx = encoder
                .index_of(value)
                .ok_or_else(|| PipelineError::UnknownCategory {
                    column: name.to_string(),
                    value: value.clone(),
                })?;
            indicators[idx][row] = 1.0;
        }
        for (feature, values) in encoder.feature_names(name).into_iter().zip(indicators) {
            encoded.insert(feature, Column::Numeric(values));
        }
    }

    for (name, column) in frame.iter() {
        if column.is_numeric() {
            encoded.insert(name, column.clone());
        }
    }
    Ok(encoded)
}

fn select(frame: Frame, features: &[String]) -> Result<Frame, PipelineError> {
    let mut selected = Frame::with_rows(frame.rows());
    for feature in features {
        let column = frame
            .get(feature)
            .ok_or_else(|| PipelineError::MissingFeature(feature.clone()))?;
        selected.insert(feature.clone(), column.clone());
    }
    Ok(selected)
}
