//! Core data models shared by the pipeline, inference and reporting layers

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::tract_ndarray::{Array2, ArrayView1, Axis};

/// Ordered numeric feature matrix handed to the model.
///
/// Column names are the declared model features, in declared order. Rows are
/// the records of a single transformed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Self {
        debug_assert_eq!(columns.len(), values.ncols());
        Self { columns, values }
    }

    /// A matrix with the given columns and no rows
    pub fn empty(columns: Vec<String>) -> Self {
        let width = columns.len();
        Self {
            columns,
            values: Array2::zeros((0, width)),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// Column values by feature name
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.values.column(idx))
    }

    /// First `n` rows (or all rows when fewer are available)
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.nrows());
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &(0..n).collect::<Vec<_>>()),
        }
    }
}

/// Body of the prediction entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<String>,
}

/// Body of the version entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub code_version: String,
    pub model_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> FeatureMatrix {
        let values = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        FeatureMatrix::new(vec!["a".to_string(), "b".to_string()], values)
    }

    #[test]
    fn test_column_lookup() {
        let m = matrix();
        let b = m.column("b").unwrap();
        assert_eq!(b.to_vec(), vec![2.0, 4.0, 6.0]);
        assert!(m.column("missing").is_none());
    }

    #[test]
    fn test_head_clamps_to_available_rows() {
        let m = matrix();
        assert_eq!(m.head(2).nrows(), 2);
        assert_eq!(m.head(10).nrows(), 3);
        assert_eq!(m.head(2).row(1).to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_empty_matrix_keeps_columns() {
        let m = FeatureMatrix::empty(vec!["x".to_string()]);
        assert_eq!(m.nrows(), 0);
        assert_eq!(m.ncols(), 1);
    }
}
