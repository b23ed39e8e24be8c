//! Gradient-boosted tree ensemble stored as JSON
//!
//! ```json
//! {
//!   "num_class": 3,
//!   "base_score": 0.0,
//!   "trees": [
//!     {"class": 0, "nodes": [
//!       {"feature": 2, "threshold": 0.5, "left": 1, "right": 2},
//!       {"leaf": 0.4},
//!       {"leaf": -0.2}
//!     ]}
//!   ]
//! }
//! ```
//!
//! Each tree contributes to one class margin. A row goes left when
//! `x[feature] < threshold`; margins are summed per class on top of the base
//! score and turned into probabilities with a softmax.

use super::output::softmax;
use super::{InferenceError, ModelBackend, ModelFlavor};
use crate::models::FeatureMatrix;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::tract_ndarray::{Array2, ArrayView1};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub class: usize,
    pub nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { leaf } => return *leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Children always point forward, which also rules out cycles
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} but the model has {} features",
                            idx, feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", idx));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", idx, child));
                        }
                    }
                }
                Node::Leaf { leaf } => {
                    if !leaf.is_finite() {
                        return Err(format!("leaf {} is not finite", idx));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub num_class: usize,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json(bytes: &[u8], n_features: usize) -> Result<Self, InferenceError> {
        let ensemble: TreeEnsemble = serde_json::from_slice(bytes)
            .map_err(|e| InferenceError::Deserialization(format!("tree ensemble: {}", e)))?;
        ensemble
            .validate(n_features)
            .map_err(|reason| InferenceError::Deserialization(format!("tree ensemble: {}", reason)))?;
        Ok(ensemble)
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.num_class == 0 {
            return Err("num_class must be positive".to_string());
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            if tree.class >= self.num_class {
                return Err(format!(
                    "tree {} targets class {} of {}",
                    idx, tree.class, self.num_class
                ));
            }
            tree.validate(n_features)
                .map_err(|reason| format!("tree {}: {}", idx, reason))?;
        }
        Ok(())
    }

    /// Class probabilities for one row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut margins = vec![self.base_score; self.num_class];
        for tree in &self.trees {
            margins[tree.class] += tree.predict(row);
        }
        softmax(&mut margins);
        margins
    }
}

pub struct TreeEnsembleBackend {
    ensemble: TreeEnsemble,
    n_features: usize,
}

impl TreeEnsembleBackend {
    pub fn load(bytes: &[u8], n_features: usize) -> Result<Self, InferenceError> {
        Ok(Self {
            ensemble: TreeEnsemble::from_json(bytes, n_features)?,
            n_features,
        })
    }
}

impl ModelBackend for TreeEnsembleBackend {
    fn flavor(&self) -> ModelFlavor {
        ModelFlavor::TreeEnsemble
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.ensemble.num_class)
    }

    fn predict_raw(&self, features: &FeatureMatrix) -> Result<Array2<f64>, InferenceError> {
        if features.ncols() != self.n_features {
            return Err(InferenceError::ShapeMismatch(format!(
                "model expects {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }
        let mut scores = Array2::zeros((features.nrows(), self.ensemble.num_class));
        for (idx, row) in features.values().rows().into_iter().enumerate() {
            for (class, p) in self.ensemble.predict_row(row).into_iter().enumerate() {
                scores[[idx, class]] = p;
            }
        }
        Ok(scores)
    }
}
