//! Access to pre-fitted transformation artifacts
//!
//! Artifacts live as `{name}.json` files in a single directory. When the
//! directory carries a `manifest.json` (artifact name to SHA-256 hex digest),
//! every read is checked against it so a deployment can never pair a pipeline
//! with artifacts other than the ones it was fitted with.

mod fitted;

pub use fitted::{
    Artifact, BinEdges, CategoryEncoder, CategoryEncoders, ColumnScaler, ColumnScalers,
    LabelEncoder, BUCKETS,
};

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Fixed artifact names
pub mod names {
    pub const BIN_EDGES: &str = "qcut_bins";
    pub const SCALERS: &str = "features_sc";
    pub const ENCODERS: &str = "features_ohe";
    pub const LABEL_ENCODER: &str = "label_ohe";
    pub const MANIFEST: &str = "manifest";
}

/// Failure to read fitted state
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{name}' not found at {path:?}")]
    NotFound { name: String, path: PathBuf },

    #[error("failed to read artifact '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact '{name}' does not match the expected shape: {source}")]
    Deserialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("checksum mismatch for artifact '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// Read-only view over an artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    manifest: Option<BTreeMap<String, String>>,
}

impl ArtifactStore {
    /// Open an artifact directory, reading its manifest when one exists
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        let manifest_path = artifact_path(&root, names::MANIFEST);

        let manifest = match std::fs::read(&manifest_path) {
            Ok(bytes) => {
                let manifest: BTreeMap<String, String> = serde_json::from_slice(&bytes)
                    .map_err(|source| ArtifactError::Deserialization {
                        name: names::MANIFEST.to_string(),
                        source,
                    })?;
                debug!(entries = manifest.len(), "Artifact manifest loaded");
                Some(manifest)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ArtifactError::Io {
                    name: names::MANIFEST.to_string(),
                    source,
                })
            }
        };

        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw bytes of an artifact, checksum-verified when a manifest is present
    pub fn read_bytes(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = artifact_path(&self.root, name);
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ArtifactError::NotFound {
                    name: name.to_string(),
                    path: path.clone(),
                }
            } else {
                ArtifactError::Io {
                    name: name.to_string(),
                    source,
                }
            }
        })?;

        if let Some(expected) = self.manifest.as_ref().and_then(|m| m.get(name)) {
            let actual = compute_checksum(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ArtifactError::ChecksumMismatch {
                    name: name.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(bytes)
    }

    /// Load and validate a named artifact
    pub fn load<T: Artifact>(&self, name: &str) -> Result<T, ArtifactError> {
        let bytes = self.read_bytes(name)?;
        let artifact: T =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Deserialization {
                name: name.to_string(),
                source,
            })?;
        artifact.validate().map_err(|reason| ArtifactError::Invalid {
            name: name.to_string(),
            reason,
        })?;
        debug!(artifact = %name, size = bytes.len(), "Artifact loaded");
        Ok(artifact)
    }
}

/// The complete fitted state one pipeline version is replayed with
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationArtifacts {
    pub age_bins: BinEdges,
    pub scalers: ColumnScalers,
    pub encoders: CategoryEncoders,
    pub label_encoder: LabelEncoder,
}

impl TransformationArtifacts {
    /// Load the four fixed artifacts from a directory
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let store = ArtifactStore::open(root)?;
        let artifacts = Self {
            age_bins: store.load(names::BIN_EDGES)?,
            scalers: store.load(names::SCALERS)?,
            encoders: store.load(names::ENCODERS)?,
            label_encoder: store.load(names::LABEL_ENCODER)?,
        };
        info!(
            path = %store.root().display(),
            scalers = artifacts.scalers.0.len(),
            encoders = artifacts.encoders.0.len(),
            classes = artifacts.label_encoder.len(),
            "Transformation artifacts loaded"
        );
        Ok(artifacts)
    }
}

fn artifact_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{}.json", name))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(artifact_path(dir.path(), name), content).unwrap();
    }

    fn write_all(dir: &TempDir) {
        write(dir, names::BIN_EDGES, "[14.0, 20.0, 22.8, 26.0, 61.0]");
        write(dir, names::SCALERS, r#"{"BMI": {"mean": 3.3, "std": 0.2}}"#);
        write(dir, names::ENCODERS, r#"{"Gender": ["Female", "Male"]}"#);
        write(dir, names::LABEL_ENCODER, r#"["Normal_Weight", "Obesity_Type_I"]"#);
    }

    #[test]
    fn test_load_all_artifacts() {
        let dir = TempDir::new().unwrap();
        write_all(&dir);

        let artifacts = TransformationArtifacts::load(dir.path()).unwrap();
        assert_eq!(artifacts.age_bins.edges().len(), 5);
        assert_eq!(artifacts.scalers.get("BMI").unwrap().std, 0.2);
        assert_eq!(artifacts.encoders.get("Gender").unwrap().categories().len(), 2);
        assert_eq!(artifacts.label_encoder.decode(0), Some("Normal_Weight"));
    }

    #[test]
    fn test_load_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write_all(&dir);

        let first = TransformationArtifacts::load(dir.path()).unwrap();
        let second = TransformationArtifacts::load(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let err = store.load::<BinEdges>(names::BIN_EDGES).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
    }

    #[test]
    fn test_wrong_shape_is_deserialization_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, names::BIN_EDGES, r#"{"edges": "nope"}"#);
        let store = ArtifactStore::open(dir.path()).unwrap();
        let err = store.load::<BinEdges>(names::BIN_EDGES).unwrap_err();
        assert!(matches!(err, ArtifactError::Deserialization { .. }));
    }

    #[test]
    fn test_invariant_violation_is_invalid() {
        let dir = TempDir::new().unwrap();
        write(&dir, names::BIN_EDGES, "[1.0, 3.0, 2.0, 4.0, 5.0]");
        let store = ArtifactStore::open(dir.path()).unwrap();
        let err = store.load::<BinEdges>(names::BIN_EDGES).unwrap_err();
        assert!(matches!(err, ArtifactError::Invalid { .. }));
    }

    #[test]
    fn test_manifest_checksum_verified() {
        let dir = TempDir::new().unwrap();
        write_all(&dir);
        let edges = fs::read(artifact_path(dir.path(), names::BIN_EDGES)).unwrap();
        let manifest = format!(
            r#"{{"{}": "{}", "{}": "{}"}}"#,
            names::BIN_EDGES,
            compute_checksum(&edges),
            names::LABEL_ENCODER,
            "0".repeat(64)
        );
        write(&dir, names::MANIFEST, &manifest);

        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(store.load::<BinEdges>(names::BIN_EDGES).is_ok());
        let err = store.load::<LabelEncoder>(names::LABEL_ENCODER).unwrap_err();
        assert!(matches!(err, ArtifactError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            compute_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
