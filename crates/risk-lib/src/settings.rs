//! Service settings
//!
//! Plain serde types; the binaries decide where values come from (files,
//! environment). Everything has a default except the model feature list,
//! which belongs to a specific fitted model and artifact set.

use crate::inference::ModelRef;
use crate::pipeline::PipelineVersion;
use crate::reports::ReportKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,
    pub model: ModelSettings,
    #[serde(default)]
    pub reports: ReportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub data_path: PathBuf,
    /// Labelled data the model was validated on
    pub reference_file_name: String,
    /// Data window monitored against the reference
    pub current_file_name: String,
    pub artifacts_path: PathBuf,
    pub target_column: String,
    /// File whose first line is the code version
    pub version_file: PathBuf,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            reference_file_name: "reference.csv".to_string(),
            current_file_name: "current.csv".to_string(),
            artifacts_path: PathBuf::from("artifacts"),
            target_column: "NObeyesdad".to_string(),
            version_file: PathBuf::from("VERSION"),
        }
    }
}

impl GeneralSettings {
    pub fn reference_path(&self) -> PathBuf {
        self.data_path.join(&self.reference_file_name)
    }

    pub fn current_path(&self) -> PathBuf {
        self.data_path.join(&self.current_file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_model_version")]
    pub version: String,
    #[serde(default = "default_model_flavor")]
    pub model_flavor: String,
    #[serde(default = "default_experiment_id")]
    pub experiment_id: String,
    #[serde(default = "default_run_id")]
    pub run_id: String,
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    #[serde(default)]
    pub pipeline_version: PipelineVersion,
    /// Model input columns, in order
    pub features: Vec<String>,
}

fn default_model_name() -> String {
    "obesity_classifier".to_string()
}

fn default_model_version() -> String {
    "1".to_string()
}

fn default_model_flavor() -> String {
    "tree_ensemble".to_string()
}

fn default_experiment_id() -> String {
    "0".to_string()
}

fn default_run_id() -> String {
    "latest".to_string()
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("models")
}

impl ModelSettings {
    pub fn model_ref(&self) -> ModelRef {
        ModelRef {
            model_name: self.model_name.clone(),
            experiment_id: self.experiment_id.clone(),
            run_id: self.run_id.clone(),
            flavor: self.model_flavor.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub reports_path: PathBuf,
    pub model_performance_report_name: String,
    pub target_drift_report_name: String,
    pub data_drift_report_name: String,
    pub data_quality_report_name: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            reports_path: PathBuf::from("reports"),
            model_performance_report_name: "model_performance.json".to_string(),
            target_drift_report_name: "target_drift.json".to_string(),
            data_drift_report_name: "data_drift.json".to_string(),
            data_quality_report_name: "data_quality.json".to_string(),
        }
    }
}

impl ReportSettings {
    /// Where a report of the given kind is written
    pub fn path_for(&self, kind: ReportKind) -> PathBuf {
        let name = match kind {
            ReportKind::ModelPerformance => &self.model_performance_report_name,
            ReportKind::TargetDrift => &self.target_drift_report_name,
            ReportKind::DataDrift => &self.data_drift_report_name,
            ReportKind::DataQuality => &self.data_quality_report_name,
        };
        self.reports_path.join(name)
    }
}
