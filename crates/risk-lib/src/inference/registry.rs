//! Model registry access

use super::{InferenceError, ModelFlavor, ModelRef};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Source of serialized model bytes
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn fetch(&self, model: &ModelRef) -> Result<Vec<u8>, InferenceError>;
}

/// Registry laid out on the local filesystem as
/// `{root}/{run_id}/{model_name}/model.{ext}`
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn model_path(&self, model: &ModelRef, flavor: ModelFlavor) -> PathBuf {
        self.root
            .join(&model.run_id)
            .join(&model.model_name)
            .join(format!("model.{}", flavor.extension()))
    }
}

#[async_trait]
impl ModelRegistry for LocalRegistry {
    async fn fetch(&self, model: &ModelRef) -> Result<Vec<u8>, InferenceError> {
        let flavor = ModelFlavor::from_str(&model.flavor)?;
        let path = self.model_path(model, flavor);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), size = bytes.len(), "Model fetched");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(InferenceError::ModelNotFound {
                model: model.model_name.clone(),
                run_id: model.run_id.clone(),
            }),
            Err(source) => Err(InferenceError::Registry { path, source }),
        }
    }
}
