//! Fitted transformation state replayed at inference time

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Invariant checks run after an artifact has been deserialized
pub trait Artifact: serde::de::DeserializeOwned {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Number of ordinal buckets produced from the bin edges
pub const BUCKETS: usize = 4;

/// Quantile bin edges for a continuous column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    pub fn new(edges: Vec<f64>) -> Result<Self, String> {
        let bins = Self { edges };
        bins.validate()?;
        Ok(bins)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bucket index for a value.
    ///
    /// Intervals are right-closed, `(e[i], e[i + 1]]`, and the first interval
    /// also contains `e[0]`. Values outside `[e[0], e[last]]` have no bucket.
    pub fn bucket(&self, value: f64) -> Option<usize> {
        let first = *self.edges.first()?;
        if value == first {
            return Some(0);
        }
        self.edges
            .windows(2)
            .position(|w| value > w[0] && value <= w[1])
    }

    /// Ordinal label for a bucket index (`q1`, `q2`, ...)
    pub fn label(bucket: usize) -> String {
        format!("q{}", bucket + 1)
    }
}

impl Artifact for BinEdges {
    fn validate(&self) -> Result<(), String> {
        if self.edges.len() != BUCKETS + 1 {
            return Err(format!(
                "expected {} bin edges, found {}",
                BUCKETS + 1,
                self.edges.len()
            ));
        }
        if self.edges.iter().any(|e| !e.is_finite()) {
            return Err("bin edges must be finite".to_string());
        }
        if self.edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err("bin edges must be strictly increasing".to_string());
        }
        Ok(())
    }
}

/// Standardization statistics for one numeric column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnScaler {
    pub mean: f64,
    pub std: f64,
}

impl ColumnScaler {
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Per-column scalers keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnScalers(pub BTreeMap<String, ColumnScaler>);

impl ColumnScalers {
    pub fn get(&self, column: &str) -> Option<&ColumnScaler> {
        self.0.get(column)
    }
}

impl Artifact for ColumnScalers {
    fn validate(&self) -> Result<(), String> {
        for (column, scaler) in &self.0 {
            if !scaler.mean.is_finite() {
                return Err(format!("scaler for '{}' has a non-finite mean", column));
            }
            if !scaler.std.is_finite() || scaler.std <= 0.0 {
                return Err(format!("scaler for '{}' must have a positive std", column));
            }
        }
        Ok(())
    }
}

/// Ordered category vocabulary for one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryEncoder {
    categories: Vec<String>,
}

impl CategoryEncoder {
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == value)
    }

    /// Output column names, `{column}_{category}` in vocabulary order
    pub fn feature_names(&self, column: &str) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| format!("{}_{}", column, c))
            .collect()
    }
}

/// Per-column categorical encoders keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryEncoders(pub BTreeMap<String, CategoryEncoder>);

impl CategoryEncoders {
    pub fn get(&self, column: &str) -> Option<&CategoryEncoder> {
        self.0.get(column)
    }
}

impl Artifact for CategoryEncoders {
    fn validate(&self) -> Result<(), String> {
        for (column, encoder) in &self.0 {
            check_vocabulary(&encoder.categories)
                .map_err(|reason| format!("encoder for '{}': {}", column, reason))?;
        }
        Ok(())
    }
}

/// Ordered target class vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class label for a class index
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Class index for a label
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    /// One-hot row for a label
    pub fn one_hot(&self, label: &str) -> Option<Vec<f64>> {
        let idx = self.encode(label)?;
        let mut row = vec![0.0; self.classes.len()];
        row[idx] = 1.0;
        Some(row)
    }
}

impl Artifact for LabelEncoder {
    fn validate(&self) -> Result<(), String> {
        check_vocabulary(&self.classes)
    }
}

fn check_vocabulary(values: &[String]) -> Result<(), String> {
    if values.is_empty() {
        return Err("vocabulary is empty".to_string());
    }
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.as_str()) {
            return Err(format!("duplicate category '{}'", value));
        }
    }
    Ok(())
}
