//! Feature engineering pipeline
//!
//! Replays the training-time transformation over raw records using only the
//! fitted artifacts, so serving never drifts from training. Each pipeline
//! version is one fixed definition; the artifact set it runs with must have
//! been fitted by the same version.

mod features;
mod frame;
mod stages;

pub use features::{
    basal_metabolic_rate, body_mass_index, body_surface_area, eats_vegetables_every_meal,
    ideal_body_weight, is_sedentary, physical_activity_level, DerivedFeature,
};
pub use frame::{Column, Frame};
pub use stages::{LogTransform, Stage, StageContext};

use crate::artifacts::TransformationArtifacts;
use crate::models::FeatureMatrix;
use crate::schema::{RawRecord, OPTIONAL_FIELDS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Failure while transforming a batch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("column '{column}' required by stage '{stage}' is missing")]
    MissingColumn { stage: &'static str, column: String },

    #[error("column '{column}' has no value in row {row}")]
    MissingValue { column: String, row: usize },

    #[error("value {value} of column '{column}' lies outside the fitted bin edges")]
    OutOfBinRange { column: String, value: f64 },

    #[error("log transform of column '{column}' is not finite in row {row}")]
    NonFinite { column: String, row: usize },

    #[error("unknown category '{value}' for column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("no fitted scaler for numeric column '{0}'")]
    MissingScaler(String),

    #[error("no fitted encoder for categorical column '{0}'")]
    MissingEncoder(String),

    #[error("model feature '{0}' is not produced by the pipeline")]
    MissingFeature(String),

    #[error("feature '{0}' is not numeric after encoding")]
    NonNumericFeature(String),
}

/// Broad class of a pipeline error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input cannot be transformed
    Validation,
    /// A categorical value is outside the fitted vocabulary
    Encoding,
    /// The fitted state does not match the pipeline definition
    Artifact,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MissingColumn { .. }
            | PipelineError::MissingValue { .. }
            | PipelineError::OutOfBinRange { .. }
            | PipelineError::NonFinite { .. } => ErrorKind::Validation,
            PipelineError::UnknownCategory { .. } => ErrorKind::Encoding,
            PipelineError::MissingScaler(_)
            | PipelineError::MissingEncoder(_)
            | PipelineError::MissingFeature(_)
            | PipelineError::NonNumericFeature(_) => ErrorKind::Artifact,
        }
    }

    /// Whether the caller's input caused the failure
    pub fn is_client_error(&self) -> bool {
        self.kind() != ErrorKind::Artifact
    }
}

/// Version of the transformation definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVersion {
    #[default]
    V1,
    V2,
}

impl fmt::Display for PipelineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineVersion::V1 => write!(f, "v1"),
            PipelineVersion::V2 => write!(f, "v2"),
        }
    }
}

/// What one pipeline version derives, drops and transforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineDefinition {
    pub derived: &'static [DerivedFeature],
    pub dropped: &'static [&'static str],
    /// Derived 0/1 flag treated as categorical
    pub flag: DerivedFeature,
    pub log: LogTransform,
    pub log_exclusions: &'static [&'static str],
}

impl PipelineVersion {
    pub fn definition(&self) -> PipelineDefinition {
        match self {
            PipelineVersion::V1 => PipelineDefinition {
                derived: &[DerivedFeature::Bmi, DerivedFeature::Bmr, DerivedFeature::IsSedentary],
                dropped: &["Height", "Weight"],
                flag: DerivedFeature::IsSedentary,
                log: LogTransform::Log1p,
                log_exclusions: &[],
            },
            PipelineVersion::V2 => PipelineDefinition {
                derived: &[
                    DerivedFeature::Bmi,
                    DerivedFeature::Pal,
                    DerivedFeature::Bsa,
                    DerivedFeature::Ibw,
                    DerivedFeature::Evemm,
                ],
                dropped: &["Height", "Weight"],
                flag: DerivedFeature::Evemm,
                log: LogTransform::Epsilon(1e-10),
                log_exclusions: &["PAL"],
            },
        }
    }
}

/// Raw records to model-ready features
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    version: PipelineVersion,
    definition: PipelineDefinition,
    artifacts: TransformationArtifacts,
    features: Vec<String>,
    /// Optional raw fields this configuration cannot do without
    required_optional: Vec<&'static str>,
}

impl FeaturePipeline {
    pub fn new(
        version: PipelineVersion,
        artifacts: TransformationArtifacts,
        features: Vec<String>,
    ) -> Self {
        let definition = version.definition();
        let stage_inputs: Vec<&'static str> = Stage::ALL
            .iter()
            .flat_map(|stage| stage.required_columns(&definition))
            .collect();

        let required_optional = OPTIONAL_FIELDS
            .iter()
            .copied()
            .filter(|field| {
                let prefix = format!("{}_", field);
                stage_inputs.contains(field)
                    || features
                        .iter()
                        .any(|f| f == field || f.starts_with(&prefix))
            })
            .collect();

        Self {
            version,
            definition,
            artifacts,
            features,
            required_optional,
        }
    }

    pub fn version(&self) -> PipelineVersion {
        self.version
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn artifacts(&self) -> &TransformationArtifacts {
        &self.artifacts
    }

    /// Transform a batch. Either every record is transformed or none is.
    pub fn transform(&self, records: &[RawRecord]) -> Result<FeatureMatrix, PipelineError> {
        if records.is_empty() {
            return Ok(FeatureMatrix::empty(self.features.clone()));
        }
        let started = Instant::now();

        let mut frame = Frame::from_records(records)?;
        for field in OPTIONAL_FIELDS {
            if self.required_optional.contains(field) {
                if !frame.contains(field) {
                    return Err(PipelineError::MissingColumn {
                        stage: "input",
                        column: field.to_string(),
                    });
                }
            } else {
                frame.remove(field);
            }
        }

        let matrix = self.transform_frame(frame)?.into_matrix()?;
        debug!(
            version = %self.version,
            rows = matrix.nrows(),
            features = matrix.ncols(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Batch transformed"
        );
        Ok(matrix)
    }

    /// Run every stage in order over a frame
    pub fn transform_frame(&self, frame: Frame) -> Result<Frame, PipelineError> {
        let ctx = StageContext {
            definition: &self.definition,
            artifacts: &self.artifacts,
            features: &self.features,
        };
        Stage::ALL
            .iter()
            .try_fold(frame, |frame, stage| stage.run(frame, &ctx))
    }
}
