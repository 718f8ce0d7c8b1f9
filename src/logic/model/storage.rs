use std::fs;
use std::path::{Path, PathBuf};

use crate::logic::detectors::DetectorKind;
use super::artifact::ModelArtifact;
use super::validate::{validate_artifact, ArtifactExpectation, ModelError, StaleReason};

/// Result of looking for a reusable artifact
#[derive(Debug)]
pub enum LoadOutcome {
    Valid(ModelArtifact),
    Missing,
    Stale(StaleReason),
}

/// One JSON file per detector under a models directory
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: DetectorKind) -> PathBuf {
        self.dir.join(format!("{}_model.json", kind.as_str()))
    }

    /// Save artifact to disk (write temp file, then rename)
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf, ModelError> {
        fs::create_dir_all(&self.dir)?;

        let kind = DetectorKind::from_name(&artifact.detector).ok_or_else(|| {
            ModelError::Incompatible(StaleReason::Corrupt(format!("unknown detector '{}'", artifact.detector)))
        })?;
        let path = self.path_for(kind);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(artifact)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        log::info!("Model saved: {} -> {}", artifact.detector, path.display());
        Ok(path)
    }

    /// Raw load without validation; None if the file does not exist
    pub fn load(&self, kind: DetectorKind) -> Result<Option<ModelArtifact>, ModelError> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let artifact: ModelArtifact = serde_json::from_slice(&data)?;
        Ok(Some(artifact))
    }

    /// Load and validate; any failure short of a missing file is reported as stale
    pub fn load_validated(&self, expected: &ArtifactExpectation) -> LoadOutcome {
        let artifact = match self.load(expected.kind) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return LoadOutcome::Missing,
            Err(ModelError::Incompatible(reason)) => return LoadOutcome::Stale(reason),
            Err(e) => return LoadOutcome::Stale(StaleReason::Corrupt(e.to_string())),
        };

        match validate_artifact(&artifact, expected) {
            Ok(()) => LoadOutcome::Valid(artifact),
            Err(ModelError::Incompatible(reason)) => {
                log::warn!("Model {} is stale: {} - will retrain", expected.kind.as_str(), reason);
                LoadOutcome::Stale(reason)
            }
            Err(e) => LoadOutcome::Stale(StaleReason::Corrupt(e.to_string())),
        }
    }

    pub fn remove(&self, kind: DetectorKind) -> Result<(), ModelError> {
        let path = self.path_for(kind);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
