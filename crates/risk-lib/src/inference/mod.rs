//! Model serving
//!
//! A [`ModelServer`] owns the model reference, the registry it is fetched
//! from and the label vocabulary. It starts unloaded; [`ModelServer::load`]
//! fetches and deserializes the model exactly once, after which predictions
//! are synchronous and CPU-bound.

mod onnx;
mod output;
mod registry;
mod tree_ensemble;

pub use onnx::OnnxBackend;
pub use output::{argmax, argmax_rows, decode_labels, softmax};
pub use registry::{LocalRegistry, ModelRegistry};
pub use tree_ensemble::{Node, Tree, TreeEnsemble, TreeEnsembleBackend};

use crate::artifacts::LabelEncoder;
use crate::evaluation;
use crate::models::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tract_onnx::prelude::tract_ndarray::Array2;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("unsupported model flavor '{0}'")]
    UnsupportedFlavor(String),

    #[error("model '{model}' not found for run '{run_id}'")]
    ModelNotFound { model: String, run_id: String },

    #[error("failed to read model from {path:?}: {source}")]
    Registry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to deserialize model: {0}")]
    Deserialization(String),

    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("class index {index} is outside the {classes} known classes")]
    UnknownClass { index: usize, classes: usize },

    #[error("model backend failed: {0}")]
    Backend(String),
}

/// Serialization format of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFlavor {
    Onnx,
    TreeEnsemble,
}

impl ModelFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFlavor::Onnx => "onnx",
            ModelFlavor::TreeEnsemble => "tree_ensemble",
        }
    }

    /// File extension of the serialized model
    pub fn extension(&self) -> &'static str {
        match self {
            ModelFlavor::Onnx => "onnx",
            ModelFlavor::TreeEnsemble => "json",
        }
    }
}

impl FromStr for ModelFlavor {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onnx" => Ok(ModelFlavor::Onnx),
            "tree_ensemble" => Ok(ModelFlavor::TreeEnsemble),
            other => Err(InferenceError::UnsupportedFlavor(other.to_string())),
        }
    }
}

impl fmt::Display for ModelFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a model in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub model_name: String,
    pub experiment_id: String,
    pub run_id: String,
    pub flavor: String,
    pub version: String,
}

/// A loaded model able to score feature matrices
pub trait ModelBackend: Send + Sync {
    fn flavor(&self) -> ModelFlavor;

    /// Number of classes the model scores, when known before running it
    fn num_classes(&self) -> Option<usize> {
        None
    }

    /// Class scores, one row per input row and one column per class
    fn predict_raw(&self, features: &FeatureMatrix) -> Result<Array2<f64>, InferenceError>;
}

/// Build the backend for a flavor from serialized bytes
pub fn load_backend(
    flavor: ModelFlavor,
    bytes: &[u8],
    n_features: usize,
) -> Result<Box<dyn ModelBackend>, InferenceError> {
    Ok(match flavor {
        ModelFlavor::Onnx => Box::new(OnnxBackend::load(bytes, n_features)?),
        ModelFlavor::TreeEnsemble => Box::new(TreeEnsembleBackend::load(bytes, n_features)?),
    })
}

/// Prediction output, either class indices or decoded labels
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    Indices(Vec<usize>),
    Labels(Vec<String>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Indices(v) => v.len(),
            Predictions::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ModelServer {
    model: ModelRef,
    registry: Arc<dyn ModelRegistry>,
    label_encoder: LabelEncoder,
    n_features: usize,
    backend: OnceCell<Box<dyn ModelBackend>>,
}

impl ModelServer {
    pub fn new(
        model: ModelRef,
        registry: Arc<dyn ModelRegistry>,
        label_encoder: LabelEncoder,
        n_features: usize,
    ) -> Self {
        Self {
            model,
            registry,
            label_encoder,
            n_features,
            backend: OnceCell::new(),
        }
    }

    /// Fetch and deserialize the model. Concurrent and repeated calls share
    /// a single fetch.
    pub async fn load(&self) -> Result<(), InferenceError> {
        self.backend
            .get_or_try_init(|| async {
                let flavor = ModelFlavor::from_str(&self.model.flavor)?;
                let started = Instant::now();
                let bytes = self.registry.fetch(&self.model).await?;
                let backend = load_backend(flavor, &bytes, self.n_features)?;
                if let Some(classes) = backend.num_classes() {
                    if classes != self.label_encoder.len() {
                        return Err(InferenceError::ShapeMismatch(format!(
                            "model scores {} classes but the label encoder knows {}",
                            classes,
                            self.label_encoder.len()
                        )));
                    }
                }
                info!(
                    model = %self.model.model_name,
                    experiment_id = %self.model.experiment_id,
                    run_id = %self.model.run_id,
                    flavor = %flavor,
                    version = %self.model.version,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                Ok::<_, InferenceError>(backend)
            })
            .await?;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.initialized()
    }

    pub fn model_ref(&self) -> &ModelRef {
        &self.model
    }

    pub fn model_version(&self) -> &str {
        &self.model.version
    }

    pub fn label_encoder(&self) -> &LabelEncoder {
        &self.label_encoder
    }

    fn backend(&self) -> Result<&dyn ModelBackend, InferenceError> {
        self.backend
            .get()
            .map(|backend| backend.as_ref())
            .ok_or(InferenceError::IllegalState("model is not loaded"))
    }

    fn predict_indices(&self, features: &FeatureMatrix) -> Result<Vec<usize>, InferenceError> {
        let backend = self.backend()?;
        if features.ncols() != self.n_features {
            return Err(InferenceError::ShapeMismatch(format!(
                "expected {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }
        if features.nrows() == 0 {
            return Ok(Vec::new());
        }

        let scores = backend.predict_raw(features)?;
        if scores.nrows() != features.nrows() {
            return Err(InferenceError::ShapeMismatch(format!(
                "model returned {} score rows for {} inputs",
                scores.nrows(),
                features.nrows()
            )));
        }
        let indices = argmax_rows(&scores)?;
        debug!(rows = indices.len(), flavor = %backend.flavor(), "Batch predicted");
        Ok(indices)
    }

    /// Predict class indices, or labels when `decode` is set
    pub fn predict(
        &self,
        features: &FeatureMatrix,
        decode: bool,
    ) -> Result<Predictions, InferenceError> {
        let indices = self.predict_indices(features)?;
        if decode {
            Ok(Predictions::Labels(decode_labels(&indices, &self.label_encoder)?))
        } else {
            Ok(Predictions::Indices(indices))
        }
    }

    /// Decoded labels for every row
    pub fn predict_labels(&self, features: &FeatureMatrix) -> Result<Vec<String>, InferenceError> {
        let indices = self.predict_indices(features)?;
        decode_labels(&indices, &self.label_encoder)
    }

    /// Weighted F1 of predictions against one-hot encoded truth
    pub fn score(
        &self,
        features: &FeatureMatrix,
        truth_one_hot: &Array2<f64>,
    ) -> Result<f64, InferenceError> {
        if truth_one_hot.nrows() != features.nrows() {
            return Err(InferenceError::ShapeMismatch(format!(
                "{} label rows for {} feature rows",
                truth_one_hot.nrows(),
                features.nrows()
            )));
        }
        let predicted = self.predict_indices(features)?;
        let truth = argmax_rows(truth_one_hot)?;
        Ok(evaluation::weighted_f1(&truth, &predicted))
    }
}

impl fmt::Debug for ModelServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelServer")
            .field("model", &self.model)
            .field("n_features", &self.n_features)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::V1_TREE_MODEL;
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tract_onnx::prelude::tract_ndarray::arr2;

    struct CountingRegistry {
        bytes: Vec<u8>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ModelRegistry for CountingRegistry {
        async fn fetch(&self, _model: &ModelRef) -> Result<Vec<u8>, InferenceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(self.bytes.clone())
        }
    }

    fn labels() -> LabelEncoder {
        LabelEncoder::new(
            ["Insufficient_Weight", "Normal_Weight", "Overweight_Level_I", "Obesity_Type_I"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    fn server(flavor: &str) -> (ModelServer, Arc<CountingRegistry>) {
        let registry = Arc::new(CountingRegistry {
            bytes: V1_TREE_MODEL.as_bytes().to_vec(),
            fetches: AtomicUsize::new(0),
        });
        let model = ModelRef {
            model_name: "classifier".to_string(),
            experiment_id: "0".to_string(),
            run_id: "run-1".to_string(),
            flavor: flavor.to_string(),
            version: "3".to_string(),
        };
        (ModelServer::new(model, registry.clone(), labels(), 7), registry)
    }

    fn features(bmi: &[f64]) -> FeatureMatrix {
        let mut values = Array2::zeros((bmi.len(), 7));
        for (row, v) in bmi.iter().enumerate() {
            values[[row, 0]] = *v;
        }
        let names = (0..7).map(|i| format!("f{}", i)).collect();
        FeatureMatrix::new(names, values)
    }

    #[test]
    fn test_flavor_parsing() {
        assert_eq!("onnx".parse::<ModelFlavor>().unwrap(), ModelFlavor::Onnx);
        assert_eq!(ModelFlavor::TreeEnsemble.extension(), "json");
        assert!(matches!(
            "sklearn".parse::<ModelFlavor>(),
            Err(InferenceError::UnsupportedFlavor(_))
        ));
    }

    #[test]
    fn test_predict_before_load_is_illegal_state() {
        let (server, _) = server("tree_ensemble");
        assert!(!server.is_loaded());
        assert!(matches!(
            server.predict(&features(&[0.0]), true),
            Err(InferenceError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let (server, registry) = server("tree_ensemble");
        let (a, b, c) = tokio::join!(server.load(), server.load(), server.load());
        a.unwrap();
        b.unwrap();
        c.unwrap();
        server.load().await.unwrap();
        assert!(server.is_loaded());
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_flavor_fails_load() {
        let (server, registry) = server("pickle");
        assert!(matches!(
            server.load().await,
            Err(InferenceError::UnsupportedFlavor(_))
        ));
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_predict_indices_and_labels() {
        let (server, _) = server("tree_ensemble");
        server.load().await.unwrap();
        let batch = features(&[-2.0, 0.0, 1.0, 2.0]);

        let indices = server.predict(&batch, false).unwrap();
        assert_eq!(indices, Predictions::Indices(vec![0, 1, 2, 3]));

        let labels = server.predict(&batch, true).unwrap();
        assert_eq!(labels.len(), 4);
        assert_eq!(
            labels,
            Predictions::Labels(vec![
                "Insufficient_Weight".to_string(),
                "Normal_Weight".to_string(),
                "Overweight_Level_I".to_string(),
                "Obesity_Type_I".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_predict_is_idempotent() {
        let (server, _) = server("tree_ensemble");
        server.load().await.unwrap();
        let batch = features(&[0.1, 1.2]);
        assert_eq!(
            server.predict_labels(&batch).unwrap(),
            server.predict_labels(&batch).unwrap()
        );
    }

    #[tokio::test]
    async fn test_score_weighted_f1() {
        let (server, _) = server("tree_ensemble");
        server.load().await.unwrap();
        let batch = features(&[0.0, 0.0, 2.0, 2.0]);

        let perfect = arr2(&[
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert!((server.score(&batch, &perfect).unwrap() - 1.0).abs() < 1e-12);

        let short = arr2(&[[0.0, 1.0, 0.0, 0.0]]);
        assert!(matches!(
            server.score(&batch, &short),
            Err(InferenceError::ShapeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_class_count_must_match_label_encoder() {
        let registry = Arc::new(CountingRegistry {
            bytes: V1_TREE_MODEL.as_bytes().to_vec(),
            fetches: AtomicUsize::new(0),
        });
        let model = ModelRef {
            model_name: "classifier".to_string(),
            experiment_id: "0".to_string(),
            run_id: "run-1".to_string(),
            flavor: "tree_ensemble".to_string(),
            version: "3".to_string(),
        };
        let three = LabelEncoder::new(
            ["Insufficient_Weight", "Normal_Weight", "Obesity_Type_I"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let server = ModelServer::new(model, registry, three, 7);

        let err = server.load().await.unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch(_)));
        assert!(err.to_string().contains("4 classes"));
        assert!(!server.is_loaded());
    }

    #[tokio::test]
    async fn test_feature_width_checked() {
        let (server, _) = server("tree_ensemble");
        server.load().await.unwrap();
        let narrow = FeatureMatrix::new(vec!["a".to_string()], Array2::zeros((1, 1)));
        assert!(matches!(
            server.predict(&narrow, false),
            Err(InferenceError::ShapeMismatch(_))
        ));
    }
}
