//! Explicitly constructed service state
//!
//! [`ServiceContext::initialize`] loads the artifacts, the model, the code
//! version and (when present) the monitoring datasets once. The context is
//! then shared read-only by all request handlers.

use crate::artifacts::TransformationArtifacts;
use crate::dataset::{load_dataset, Dataset, DatasetError};
use crate::health::{components, ComponentHealth, HealthResponse};
use crate::inference::{InferenceError, ModelRegistry, ModelServer};
use crate::models::VersionInfo;
use crate::pipeline::{ErrorKind, FeaturePipeline, Frame, PipelineError};
use crate::reports::{self, ColumnMapping, ReportError, ReportFrame, ReportKind};
use crate::schema::{MonitoringQuery, RawRecord, ValidationError};
use crate::settings::Settings;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Name of the prediction column in monitoring reports
pub const PREDICTION_COLUMN: &str = "prediction";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("monitoring data is not available")]
    MonitoringUnavailable,

    #[error("current monitoring data failed the feature pipeline: {0}")]
    MonitoringData(#[source] PipelineError),
}

/// Class of a request the service refused to process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Input outside the accepted schema or fitted ranges
    Validation,
    /// Category outside the fitted vocabulary, a drift signal
    Encoding,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Validation => "validation",
            Rejection::Encoding => "encoding",
        }
    }
}

impl ServiceError {
    /// Why the request was refused, `None` when the service is at fault
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            ServiceError::Validation(_) => Some(Rejection::Validation),
            ServiceError::Pipeline(e) => match e.kind() {
                ErrorKind::Validation => Some(Rejection::Validation),
                ErrorKind::Encoding => Some(Rejection::Encoding),
                ErrorKind::Artifact => None,
            },
            _ => None,
        }
    }

    /// Whether the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        self.rejection().is_some()
    }
}

/// Labels for a batch plus where the time went
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub labels: Vec<String>,
    pub transform_time: Duration,
    pub inference_time: Duration,
}

#[derive(Debug)]
struct MonitoringData {
    reference: ReportFrame,
    current: Dataset,
}

#[derive(Debug)]
pub struct ServiceContext {
    settings: Settings,
    pipeline: FeaturePipeline,
    model: ModelServer,
    monitoring: Option<MonitoringData>,
    code_version: String,
}

impl ServiceContext {
    pub async fn initialize(
        settings: Settings,
        registry: Arc<dyn ModelRegistry>,
    ) -> anyhow::Result<Self> {
        let artifacts = TransformationArtifacts::load(&settings.general.artifacts_path)
            .context("Failed to load transformation artifacts")?;

        let model = ModelServer::new(
            settings.model.model_ref(),
            registry,
            artifacts.label_encoder.clone(),
            settings.model.features.len(),
        );
        model.load().await.context("Failed to load model")?;

        let pipeline = FeaturePipeline::new(
            settings.model.pipeline_version,
            artifacts,
            settings.model.features.clone(),
        );

        let code_version = read_code_version(&settings.general.version_file).with_context(|| {
            format!(
                "Failed to read code version from {}",
                settings.general.version_file.display()
            )
        })?;

        let mut context = Self {
            settings,
            pipeline,
            model,
            monitoring: None,
            code_version,
        };
        context.monitoring = context.load_monitoring_data()?;

        info!(
            code_version = %context.code_version,
            model_version = %context.model.model_version(),
            pipeline = %context.pipeline.version(),
            features = context.pipeline.features().len(),
            monitoring = context.monitoring.is_some(),
            "Service initialized"
        );
        Ok(context)
    }

    fn load_monitoring_data(&self) -> anyhow::Result<Option<MonitoringData>> {
        let general = &self.settings.general;
        let (reference_path, current_path) = (general.reference_path(), general.current_path());
        if !reference_path.exists() || !current_path.exists() {
            warn!(
                reference = %reference_path.display(),
                current = %current_path.display(),
                "Monitoring datasets not found, monitoring disabled"
            );
            return Ok(None);
        }

        let reference = load_dataset(&reference_path, &general.target_column)
            .context("Failed to load reference dataset")?;
        let current = load_dataset(&current_path, &general.target_column)
            .context("Failed to load current dataset")?;
        let reference = self
            .report_frame(reference)
            .context("Failed to score reference dataset")?;

        Ok(Some(MonitoringData { reference, current }))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn model(&self) -> &ModelServer {
        &self.model
    }

    pub fn has_monitoring(&self) -> bool {
        self.monitoring.is_some()
    }

    /// Health of each component as currently held
    pub fn health(&self) -> HealthResponse {
        let pipeline = if self.pipeline.features().is_empty() {
            ComponentHealth::unhealthy("no model features are configured")
        } else {
            ComponentHealth::healthy(format!(
                "pipeline {} producing {} features",
                self.pipeline.version(),
                self.pipeline.features().len()
            ))
        };

        let model = if self.model.is_loaded() {
            let model = self.model.model_ref();
            ComponentHealth::healthy(format!(
                "{} version {} ({})",
                model.model_name, model.version, model.flavor
            ))
        } else {
            ComponentHealth::unhealthy("model is not loaded")
        };

        let reference_data = match &self.monitoring {
            Some(data) => ComponentHealth::healthy(format!(
                "{} reference rows, {} current rows",
                data.reference.rows(),
                data.current.records.len()
            )),
            None => ComponentHealth::degraded("monitoring datasets not found"),
        };

        HealthResponse::from_components([
            (components::PIPELINE, pipeline),
            (components::MODEL, model),
            (components::REFERENCE_DATA, reference_data),
        ])
    }

    pub fn versions(&self) -> VersionInfo {
        VersionInfo {
            code_version: self.code_version.clone(),
            model_version: self.model.model_version().to_string(),
        }
    }

    /// Validate, transform and classify a batch
    pub fn predict(&self, records: &[RawRecord]) -> Result<PredictionOutcome, ServiceError> {
        for record in records {
            record.validate()?;
        }

        let started = Instant::now();
        let features = self.pipeline.transform(records)?;
        let transform_time = started.elapsed();

        let started = Instant::now();
        let labels = self.model.predict_labels(&features)?;
        let inference_time = started.elapsed();

        Ok(PredictionOutcome {
            labels,
            transform_time,
            inference_time,
        })
    }

    /// Transformed features with true and predicted labels
    fn report_frame(&self, dataset: Dataset) -> Result<ReportFrame, ServiceError> {
        let features = self.pipeline.transform(&dataset.records)?;
        let prediction = self.model.predict_labels(&features)?;
        Ok(ReportFrame {
            features: Frame::from_matrix(&features),
            target: dataset.target,
            prediction,
        })
    }

    /// Build a report over the first `window_size` rows of the current data
    pub fn build_report(&self, kind: ReportKind, query: MonitoringQuery) -> Result<PathBuf, ServiceError> {
        query.validate()?;
        let monitoring = self
            .monitoring
            .as_ref()
            .ok_or(ServiceError::MonitoringUnavailable)?;

        // The current data is ours; a pipeline failure on it is not the caller's fault
        let current = self
            .report_frame(monitoring.current.head(query.window_size))
            .map_err(|e| match e {
                ServiceError::Pipeline(source) => ServiceError::MonitoringData(source),
                other => other,
            })?;
        let mapping = ColumnMapping::from_frame(
            &monitoring.reference.features,
            &self.settings.general.target_column,
            PREDICTION_COLUMN,
        );
        let path = self.settings.reports.path_for(kind);
        Ok(reports::build_report(
            kind,
            &current,
            &monitoring.reference,
            &mapping,
            &path,
        )?)
    }

    /// Build a report and return its JSON body
    pub fn report_json(
        &self,
        kind: ReportKind,
        query: MonitoringQuery,
    ) -> Result<serde_json::Value, ServiceError> {
        let path = self.build_report(kind, query)?;
        let io_error = |source| ReportError::Io {
            path: path.clone(),
            source,
        };
        let bytes = std::fs::read(&path).map_err(io_error)?;
        Ok(serde_json::from_slice(&bytes).map_err(ReportError::Serialization)?)
    }
}

/// First line of the version file
pub fn read_code_version(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::example_record;
    use crate::pipeline::{Column, PipelineVersion};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_code_version_first_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1.4.2\nbuilt from main").unwrap();
        assert_eq!(read_code_version(file.path()).unwrap(), "1.4.2");
    }

    #[test]
    fn test_error_classes() {
        let validation = ServiceError::from(ValidationError::new("Age", "must not be 0"));
        assert!(validation.is_client_error());

        let encoding = ServiceError::from(PipelineError::UnknownCategory {
            column: "CALC".to_string(),
            value: "x".to_string(),
        });
        assert!(encoding.is_client_error());
        assert_eq!(encoding.rejection(), Some(Rejection::Encoding));

        let out_of_bins = ServiceError::from(PipelineError::OutOfBinRange {
            column: "Age".to_string(),
            value: 70.0,
        });
        assert_eq!(out_of_bins.rejection(), Some(Rejection::Validation));
        assert_eq!(validation.rejection(), Some(Rejection::Validation));

        let monitoring = ServiceError::MonitoringData(PipelineError::OutOfBinRange {
            column: "Age".to_string(),
            value: 70.0,
        });
        assert!(!monitoring.is_client_error());

        let artifact = ServiceError::from(PipelineError::MissingEncoder("CALC".to_string()));
        assert!(!artifact.is_client_error());
        assert!(!ServiceError::MonitoringUnavailable.is_client_error());
    }

    #[test]
    fn test_frame_from_matrix_keeps_feature_order() {
        let pipeline = FeaturePipeline::new(
            PipelineVersion::V1,
            crate::pipeline::fixtures::v1_artifacts(),
            crate::pipeline::fixtures::v1_features(),
        );
        let matrix = pipeline.transform(&[example_record()]).unwrap();
        let frame = Frame::from_matrix(&matrix);
        assert_eq!(frame.names(), matrix.columns());
        assert!(matches!(frame.get("BMI"), Some(Column::Numeric(_))));
    }
}
