//! Model Artifact - persisted trained state of one detector
//!
//! The trained state is stored as an opaque JSON string so the checksum covers
//! exactly the bytes that will be decoded back.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::MODEL_FORMAT_VERSION;
use crate::logic::detectors::DetectorKind;
use crate::logic::features::{layout_hash, FEATURE_VERSION};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// Detector name (`DetectorKind::as_str`)
    pub detector: String,
    pub feature_version: u8,
    pub feature_width: usize,
    pub layout_hash: u32,
    pub hyperparameters: serde_json::Value,
    /// Rows the detector actually trained on
    pub sample_size: usize,
    pub created_at: DateTime<Utc>,
    /// Serialized trained state
    pub state: String,
    /// SHA-256 over metadata + state
    pub checksum: String,
}

impl ModelArtifact {
    /// Package a trained state for `kind`
    pub fn build<S: Serialize>(
        kind: DetectorKind,
        feature_width: usize,
        hyperparameters: serde_json::Value,
        sample_size: usize,
        state: &S,
    ) -> Result<Self, serde_json::Error> {
        let mut artifact = Self {
            format_version: MODEL_FORMAT_VERSION,
            detector: kind.as_str().to_string(),
            feature_version: FEATURE_VERSION,
            feature_width,
            layout_hash: layout_hash(),
            hyperparameters,
            sample_size,
            created_at: Utc::now(),
            state: serde_json::to_string(state)?,
            checksum: String::new(),
        };
        artifact.checksum = artifact.compute_checksum();
        Ok(artifact)
    }

    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.format_version.to_le_bytes());
        hasher.update(self.detector.as_bytes());
        hasher.update([self.feature_version]);
        hasher.update((self.feature_width as u64).to_le_bytes());
        hasher.update(self.layout_hash.to_le_bytes());
        hasher.update(self.hyperparameters.to_string().as_bytes());
        hasher.update((self.sample_size as u64).to_le_bytes());
        hasher.update(self.created_at.to_rfc3339().as_bytes());
        hasher.update(self.state.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn checksum_matches(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    pub fn decode_state<S: DeserializeOwned>(&self) -> Result<S, serde_json::Error> {
        serde_json::from_str(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        mean: Vec<f64>,
    }

    #[test]
    fn test_build_and_decode() {
        let state = Dummy { mean: vec![0.1, 1.0 / 3.0, 2.5e-17] };
        let artifact = ModelArtifact::build(
            DetectorKind::Statistical,
            20,
            serde_json::json!({ "threshold": 3.0 }),
            10,
            &state,
        )
        .unwrap();

        assert!(artifact.checksum_matches());
        assert_eq!(artifact.detector, "statistical");
        assert_eq!(artifact.decode_state::<Dummy>().unwrap(), state);
    }

    #[test]
    fn test_tampered_state_breaks_checksum() {
        let mut artifact =
            ModelArtifact::build(DetectorKind::Keyword, 20, serde_json::json!({}), 0, &Dummy { mean: vec![1.0] })
                .unwrap();
        artifact.state = r#"{"mean":[2.0]}"#.to_string();
        assert!(!artifact.checksum_matches());
    }
}
