//! ONNX backend using tract
//!
//! The graph is optimized once at load time with a fixed `f32[1, n]` input
//! fact and then run once per row.

use super::{InferenceError, ModelBackend, ModelFlavor};
use crate::models::FeatureMatrix;
use std::time::Instant;
use tract_onnx::prelude::tract_ndarray::Array2;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Per-batch latency above which a warning is logged
const SLOW_BATCH_MS: u128 = 50;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxBackend {
    plan: OnnxPlan,
    n_features: usize,
}

impl OnnxBackend {
    /// Parse and optimize an ONNX model from bytes
    pub fn load(model_bytes: &[u8], n_features: usize) -> Result<Self, InferenceError> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .and_then(|model| model.with_input_fact(0, f32::fact([1, n_features]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::Deserialization(format!("ONNX model: {}", e)))?;
        Ok(Self { plan, n_features })
    }

    fn run_row(&self, row: &[f32]) -> Result<Vec<f64>, InferenceError> {
        let input = Tensor::from_shape(&[1, self.n_features], row)
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        // classifiers may also emit a label tensor; the first float output holds the scores
        outputs
            .iter()
            .find_map(|output| output.to_array_view::<f32>().ok())
            .map(|view| view.iter().map(|&v| v as f64).collect())
            .ok_or_else(|| InferenceError::Backend("model produced no f32 output".to_string()))
    }
}

impl ModelBackend for OnnxBackend {
    fn flavor(&self) -> ModelFlavor {
        ModelFlavor::Onnx
    }

    fn predict_raw(&self, features: &FeatureMatrix) -> Result<Array2<f64>, InferenceError> {
        let start = Instant::now();
        let mut width = None;
        let mut data = Vec::new();

        for row in features.values().rows() {
            let input: Vec<f32> = row.iter().map(|&v| v as f32).collect();
            let scores = self.run_row(&input)?;
            match width {
                None => width = Some(scores.len()),
                Some(w) if w != scores.len() => {
                    return Err(InferenceError::Backend(format!(
                        "inconsistent output width: {} then {}",
                        w,
                        scores.len()
                    )))
                }
                Some(_) => {}
            }
            data.extend(scores);
        }

        let scores = Array2::from_shape_vec((features.nrows(), width.unwrap_or(0)), data)
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_BATCH_MS {
            warn!(elapsed_ms = elapsed.as_millis() as u64, rows = features.nrows(), "Slow ONNX batch");
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, rows = features.nrows(), "ONNX batch scored");
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = OnnxBackend::load(b"definitely not onnx", 4).err().unwrap();
        assert!(matches!(err, InferenceError::Deserialization(_)));
    }
}
