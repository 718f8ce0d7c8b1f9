use crate::constants::MODEL_FORMAT_VERSION;
use crate::logic::detectors::DetectorKind;
use crate::logic::features::{layout_hash, FEATURE_VERSION};
use super::artifact::ModelArtifact;

/// Why a persisted artifact cannot be reused. Always means "retrain".
#[derive(Debug, Clone, PartialEq)]
pub enum StaleReason {
    FormatVersion { expected: u32, actual: u32 },
    DetectorMismatch { expected: String, actual: String },
    FeatureWidth { expected: usize, actual: usize },
    LayoutMismatch {
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },
    Hyperparameters,
    ChecksumMismatch,
    Corrupt(String),
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::FormatVersion { expected, actual } => {
                write!(f, "format version {} (expected {})", actual, expected)
            }
            StaleReason::DetectorMismatch { expected, actual } => {
                write!(f, "artifact belongs to '{}' (expected '{}')", actual, expected)
            }
            StaleReason::FeatureWidth { expected, actual } => {
                write!(f, "feature width {} (expected {})", actual, expected)
            }
            StaleReason::LayoutMismatch { expected_version, expected_hash, actual_version, actual_hash } => {
                write!(f, "layout v{} ({:x}), expected v{} ({:x})",
                    actual_version, actual_hash, expected_version, expected_hash)
            }
            StaleReason::Hyperparameters => write!(f, "hyperparameters changed"),
            StaleReason::ChecksumMismatch => write!(f, "checksum mismatch"),
            StaleReason::Corrupt(msg) => write!(f, "corrupt artifact: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum ModelError {
    IoError(std::io::Error),
    SerializationError(serde_json::Error),
    Incompatible(StaleReason),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::IoError(e) => write!(f, "Model IO Error: {}", e),
            ModelError::SerializationError(e) => write!(f, "Model Serialization Error: {}", e),
            ModelError::Incompatible(reason) => write!(f, "Stale model artifact: {}", reason),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::IoError(err)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::SerializationError(err)
    }
}

/// What the running engine expects an artifact to look like
#[derive(Debug, Clone)]
pub struct ArtifactExpectation {
    pub kind: DetectorKind,
    pub feature_width: usize,
    pub hyperparameters: serde_json::Value,
}

/// Validate artifact compatibility with the current engine
pub fn validate_artifact(artifact: &ModelArtifact, expected: &ArtifactExpectation) -> Result<(), ModelError> {
    let stale = |reason| Err(ModelError::Incompatible(reason));

    if artifact.format_version != MODEL_FORMAT_VERSION {
        return stale(StaleReason::FormatVersion {
            expected: MODEL_FORMAT_VERSION,
            actual: artifact.format_version,
        });
    }
    if artifact.detector != expected.kind.as_str() {
        return stale(StaleReason::DetectorMismatch {
            expected: expected.kind.as_str().to_string(),
            actual: artifact.detector.clone(),
        });
    }
    if artifact.feature_width != expected.feature_width {
        return stale(StaleReason::FeatureWidth {
            expected: expected.feature_width,
            actual: artifact.feature_width,
        });
    }
    if artifact.feature_version != FEATURE_VERSION || artifact.layout_hash != layout_hash() {
        return stale(StaleReason::LayoutMismatch {
            expected_version: FEATURE_VERSION,
            expected_hash: layout_hash(),
            actual_version: artifact.feature_version,
            actual_hash: artifact.layout_hash,
        });
    }
    if artifact.hyperparameters != expected.hyperparameters {
        return stale(StaleReason::Hyperparameters);
    }
    if !artifact.checksum_matches() {
        return stale(StaleReason::ChecksumMismatch);
    }
    Ok(())
}
