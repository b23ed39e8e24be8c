//! Columnar working table the pipeline stages operate on

use super::PipelineError;
use crate::models::FeatureMatrix;
use crate::schema::{RawRecord, CATEGORY_RULES, FLAG_FIELDS, NUMERIC_RULES};
use tract_onnx::prelude::tract_ndarray::Array2;

/// A typed column. Stages dispatch on the variant the way the training code
/// dispatched on column dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }
}

/// Ordered set of equally long named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Frame {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            rows,
        }
    }

    /// Build a frame from raw records.
    ///
    /// Optional fields become a column only when at least one record carries
    /// them; a field carried by some records but not others is an error.
    pub fn from_records(records: &[RawRecord]) -> Result<Self, PipelineError> {
        let mut frame = Self::with_rows(records.len());

        for rule in NUMERIC_RULES {
            let values: Vec<Option<f64>> = records.iter().map(|r| r.numeric(rule.field)).collect();
            if let Some(column) = complete(rule.field, values)? {
                frame.insert(rule.field, Column::Numeric(column));
            }
        }

        let categorical = CATEGORY_RULES.iter().map(|r| r.field).chain(FLAG_FIELDS.iter().copied());
        for field in categorical {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|r| r.categorical(field).map(str::to_string))
                .collect();
            if let Some(column) = complete(field, values)? {
                frame.insert(field, Column::Categorical(column));
            }
        }

        Ok(frame)
    }

    /// Frame view of an already transformed feature matrix
    pub fn from_matrix(matrix: &FeatureMatrix) -> Self {
        let mut frame = Self::with_rows(matrix.nrows());
        for (idx, name) in matrix.columns().iter().enumerate() {
            let values = matrix.values().column(idx).to_vec();
            frame.insert(name, Column::Numeric(values));
        }
        frame
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|idx| &self.columns[idx])
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.get(name)? {
            Column::Numeric(v) => Some(v),
            Column::Categorical(_) => None,
        }
    }

    pub fn categorical(&self, name: &str) -> Option<&[String]> {
        match self.get(name)? {
            Column::Categorical(v) => Some(v),
            Column::Numeric(_) => None,
        }
    }

    /// Insert a column, replacing any column of the same name in place
    pub fn insert(&mut self, name: impl Into<String>, column: Column) {
        let name = name.into();
        debug_assert_eq!(column.len(), self.rows, "column '{}' has wrong length", name);
        match self.position(&name) {
            Some(idx) => self.columns[idx] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let idx = self.position(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    /// Names of numeric columns in frame order
    pub fn numeric_columns(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, c)| c.is_numeric())
            .map(|(n, _)| n.to_string())
            .collect()
    }

    /// Names of categorical columns in frame order
    pub fn categorical_columns(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, c)| !c.is_numeric())
            .map(|(n, _)| n.to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Convert an all-numeric frame into a feature matrix, keeping column order
    pub fn into_matrix(self) -> Result<FeatureMatrix, PipelineError> {
        let mut numeric = Vec::with_capacity(self.columns.len());
        for (name, column) in self.names.iter().zip(&self.columns) {
            let Column::Numeric(values) = column else {
                return Err(PipelineError::NonNumericFeature(name.clone()));
            };
            numeric.push(values.as_slice());
        }
        let values = Array2::from_shape_fn((self.rows, numeric.len()), |(row, col)| {
            numeric[col][row]
        });
        Ok(FeatureMatrix::new(self.names, values))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Collapse optional per-record values into a column
fn complete<T>(field: &str, values: Vec<Option<T>>) -> Result<Option<Vec<T>>, PipelineError> {
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    let mut column = Vec::with_capacity(values.len());
    for (row, value) in values.into_iter().enumerate() {
        match value {
            Some(v) => column.push(v),
            None => {
                return Err(PipelineError::MissingValue {
                    column: field.to_string(),
                    row,
                })
            }
        }
    }
    Ok(Some(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::example_record;

    #[test]
    fn test_from_records_skips_absent_optional_fields() {
        let frame = Frame::from_records(&[example_record(), example_record()]).unwrap();
        assert_eq!(frame.rows(), 2);
        assert!(frame.contains("Age"));
        assert!(frame.contains("SMOKE"));
        assert!(!frame.contains("NCP"));
        assert!(!frame.contains("FAVC"));
        assert_eq!(frame.numeric("Height"), Some(&[1.62, 1.62][..]));
        assert_eq!(frame.categorical("Gender").unwrap()[0], "Female");
    }

    #[test]
    fn test_from_records_rejects_partially_present_field() {
        let mut with_ncp = example_record();
        with_ncp.ncp = Some(3.0);
        let err = Frame::from_records(&[with_ncp, example_record()]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingValue { ref column, row: 1 } if column == "NCP"));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut frame = Frame::with_rows(1);
        frame.insert("a", Column::Numeric(vec![1.0]));
        frame.insert("b", Column::Numeric(vec![2.0]));
        frame.insert("a", Column::Categorical(vec!["x".to_string()]));
        assert_eq!(frame.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(frame.categorical_columns(), vec!["a"]);
        assert_eq!(frame.numeric_columns(), vec!["b"]);
    }

    #[test]
    fn test_into_matrix_row_major() {
        let mut frame = Frame::with_rows(2);
        frame.insert("a", Column::Numeric(vec![1.0, 2.0]));
        frame.insert("b", Column::Numeric(vec![3.0, 4.0]));
        let matrix = frame.into_matrix().unwrap();
        assert_eq!(matrix.row(0).to_vec(), vec![1.0, 3.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_into_matrix_rejects_categorical() {
        let mut frame = Frame::with_rows(1);
        frame.insert("a", Column::Categorical(vec!["x".to_string()]));
        assert!(matches!(
            frame.into_matrix(),
            Err(PipelineError::NonNumericFeature(_))
        ));
    }
}
