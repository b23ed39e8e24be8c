//! CSV dataset loading
//!
//! Rows map onto [`RawRecord`] by header name. Columns outside the schema
//! (row ids and the like) are ignored and the target column, when present,
//! is split off.

use crate::schema::{RawRecord, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("row {row} of {path:?} does not match the record schema: {source}")]
    Malformed {
        path: PathBuf,
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("row {row} of {path:?} is invalid: {source}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        #[source]
        source: ValidationError,
    },
}

/// Validated records, plus their labels when the file carries them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<RawRecord>,
    pub target: Option<Vec<String>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Dataset {
        let n = n.min(self.len());
        Dataset {
            records: self.records[..n].to_vec(),
            target: self.target.as_ref().map(|t| t[..n].to_vec()),
        }
    }
}

/// Load and validate every row of a CSV file
pub fn load_dataset(path: impl AsRef<Path>, target_column: &str) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let read_error = |source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(read_error)?;
    let headers = reader.headers().map_err(read_error)?.clone();
    let target_idx = headers.iter().position(|h| h == target_column);

    let mut records = Vec::new();
    let mut target = target_idx.map(|_| Vec::new());

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(read_error)?;
        let raw: RawRecord =
            record
                .deserialize(Some(&headers))
                .map_err(|source| DatasetError::Malformed {
                    path: path.to_path_buf(),
                    row,
                    source,
                })?;
        raw.validate().map_err(|source| DatasetError::InvalidRow {
            path: path.to_path_buf(),
            row,
            source,
        })?;

        if let (Some(idx), Some(labels)) = (target_idx, target.as_mut()) {
            labels.push(record.get(idx).unwrap_or_default().to_string());
        }
        records.push(raw);
    }

    info!(
        path = %path.display(),
        rows = records.len(),
        labelled = target.is_some(),
        "Dataset loaded"
    );
    Ok(Dataset { records, target })
}
