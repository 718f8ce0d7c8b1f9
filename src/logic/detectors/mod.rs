//! Detectors Module - Independent anomaly scorers
//!
//! Every detector scores the same feature matrix independently; the ensemble
//! only ever sees the normalized [0, 1] score of each one.

pub mod sampling;
pub mod tree_partition;
pub mod boundary;
pub mod statistical;
pub mod keyword;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::config::EngineConfig;
use crate::logic::features::{FeatureMatrix, FEATURE_COUNT};
use crate::logic::governor::ComputeBackend;
use crate::logic::model::{ArtifactExpectation, ModelArtifact};
use crate::logic::records::LogRecord;

pub use boundary::BoundaryDetector;
pub use keyword::KeywordDetector;
pub use statistical::{StatisticalDetector, StatisticalMethod};
pub use tree_partition::TreePartitionDetector;

/// Fewest rows any trainable detector accepts
pub const MIN_TRAINING_ROWS: usize = 2;

// ============================================================================
// DETECTOR KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    TreePartition,
    Boundary,
    Statistical,
    Keyword,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::TreePartition,
        DetectorKind::Boundary,
        DetectorKind::Statistical,
        DetectorKind::Keyword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::TreePartition => "tree_partition",
            DetectorKind::Boundary => "boundary",
            DetectorKind::Statistical => "statistical",
            DetectorKind::Keyword => "keyword",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Human label used in explanations
    pub fn label(&self) -> &'static str {
        match self {
            DetectorKind::TreePartition => "tree partition",
            DetectorKind::Boundary => "novelty boundary",
            DetectorKind::Statistical => "statistical deviation",
            DetectorKind::Keyword => "keyword rules",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

/// Everything a detector may look at for one batch or chunk
#[derive(Debug, Clone)]
pub struct DetectorInput {
    pub record_ids: Vec<String>,
    pub features: FeatureMatrix,
    /// Lowercased message text
    pub texts: Vec<String>,
    /// Lowercased, trimmed source
    pub sources: Vec<String>,
    /// Uppercased record severity, used for stratified sampling
    pub labels: Vec<Option<String>>,
    /// Size of the batch these rows were drawn from; equals `rows()` unless
    /// the engine handed over a training sample
    pub population: usize,
}

impl DetectorInput {
    pub fn from_records(records: &[LogRecord], features: FeatureMatrix) -> Self {
        Self {
            record_ids: records.iter().map(|r| r.id.clone()).collect(),
            features,
            texts: records.iter().map(|r| r.message.to_lowercase()).collect(),
            sources: records.iter().map(|r| r.source.trim().to_lowercase()).collect(),
            labels: records.iter().map(severity_label).collect(),
            population: records.len(),
        }
    }

    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population.max(self.rows());
        self
    }

    pub fn rows(&self) -> usize {
        self.record_ids.len()
    }
}

/// Stratification key of a record: its trimmed, uppercased severity
pub fn severity_label(record: &LogRecord) -> Option<String> {
    record
        .severity
        .as_deref()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
}

/// One detector's verdict on one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub record_id: String,
    pub detector: DetectorKind,
    /// Detector-native score, higher = more anomalous
    pub raw_score: f64,
    /// Calibrated to [0, 1]
    pub normalized_score: f64,
    pub explanation: Option<String>,
    pub failed: bool,
}

impl DetectorResult {
    pub fn new(record_id: &str, detector: DetectorKind, raw_score: f64, normalized_score: f64) -> Self {
        Self {
            record_id: record_id.to_string(),
            detector,
            raw_score,
            normalized_score: normalized_score.clamp(0.0, 1.0),
            explanation: None,
            failed: false,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn failure(record_id: &str, detector: DetectorKind, reason: &str) -> Self {
        Self {
            record_id: record_id.to_string(),
            detector,
            raw_score: 0.0,
            normalized_score: 0.0,
            explanation: Some(reason.to_string()),
            failed: true,
        }
    }
}

/// Record of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub session_id: String,
    pub detector: DetectorKind,
    pub input_size: usize,
    pub sample_size: usize,
    pub elapsed_secs: f64,
    pub backend: ComputeBackend,
    pub trained_at: DateTime<Utc>,
}

impl TrainingSession {
    pub fn new(detector: DetectorKind, input_size: usize, sample_size: usize, elapsed_secs: f64, backend: ComputeBackend) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            detector,
            input_size,
            sample_size,
            elapsed_secs,
            backend,
            trained_at: Utc::now(),
        }
    }

    pub fn sampled_fraction(&self) -> f64 {
        if self.input_size == 0 {
            0.0
        } else {
            self.sample_size as f64 / self.input_size as f64
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum DetectorError {
    InsufficientData { detector: DetectorKind, rows: usize, required: usize },
    NotFitted(DetectorKind),
    WidthMismatch { detector: DetectorKind, expected: usize, actual: usize },
    SerializationError(serde_json::Error),
    Failed { detector: DetectorKind, reason: String },
}

impl std::fmt::Display for DetectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorError::InsufficientData { detector, rows, required } => {
                write!(f, "{}: insufficient training data ({} rows, need {})", detector, rows, required)
            }
            DetectorError::NotFitted(detector) => write!(f, "{}: scored before training", detector),
            DetectorError::WidthMismatch { detector, expected, actual } => {
                write!(f, "{}: feature width {} (expected {})", detector, actual, expected)
            }
            DetectorError::SerializationError(e) => write!(f, "Detector Serialization Error: {}", e),
            DetectorError::Failed { detector, reason } => write!(f, "{}: {}", detector, reason),
        }
    }
}

impl std::error::Error for DetectorError {}

impl From<serde_json::Error> for DetectorError {
    fn from(err: serde_json::Error) -> Self {
        DetectorError::SerializationError(err)
    }
}

// ============================================================================
// DETECTOR TRAIT
// ============================================================================

/// Common contract for every detector. Training mutates; scoring is read-only
/// so one fitted instance can score chunks from any worker thread.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Everything that changes the trained state; part of artifact validation
    fn hyperparameters(&self) -> serde_json::Value;

    fn is_fitted(&self) -> bool;

    /// Rule-based detectors are ready without a fit step
    fn requires_training(&self) -> bool {
        true
    }

    fn fit(&mut self, input: &DetectorInput) -> Result<TrainingSession, DetectorError>;

    /// One result per input row, in row order
    fn score(&self, input: &DetectorInput) -> Result<Vec<DetectorResult>, DetectorError>;

    fn serialize(&self) -> Result<ModelArtifact, DetectorError>;

    /// Adopt a persisted state; false when the artifact is incompatible
    fn restore(&mut self, artifact: &ModelArtifact) -> bool;

    fn expectation(&self) -> ArtifactExpectation {
        ArtifactExpectation {
            kind: self.kind(),
            feature_width: FEATURE_COUNT,
            hyperparameters: self.hyperparameters(),
        }
    }
}

/// Detector implementation for a kind, configured from the engine config
pub fn build_detector(kind: DetectorKind, config: &EngineConfig, backend: ComputeBackend) -> Box<dyn Detector> {
    match kind {
        DetectorKind::TreePartition => Box::new(TreePartitionDetector::new(
            config.tree_count,
            config.tree_sample_size,
            config.random_seed,
        )),
        DetectorKind::Boundary => Box::new(BoundaryDetector::new(
            config.boundary_detector_sample_cap,
            config.boundary_support_vectors,
            config.boundary_nu,
            config.random_seed,
            backend,
        )),
        DetectorKind::Statistical => Box::new(StatisticalDetector::new(
            config.statistical_method,
            config.statistical_threshold,
        )),
        DetectorKind::Keyword => Box::new(KeywordDetector::new()),
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Maps raw training scores onto [0, 1]: the training median maps to 0 and
/// `high` to 1. Frozen at fit time so scores never depend on which other
/// records share a chunk.
///
/// `high` is the training maximum, but never closer to the median than
/// `min_span` (in the detector's raw units). Without the floor the least
/// typical record of a clean batch would always saturate at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCalibration {
    pub low: f64,
    pub high: f64,
}

impl ScoreCalibration {
    pub fn from_training(raw_scores: &[f64], min_span: f64) -> Self {
        if raw_scores.is_empty() {
            return Self { low: 0.0, high: 1.0 };
        }
        let mut sorted = raw_scores.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let low = percentile(&sorted, 0.5);
        let max = sorted[sorted.len() - 1];
        let floor = if min_span.is_finite() { min_span.max(0.0) } else { 0.0 };
        Self {
            low,
            high: max.max(low + floor),
        }
    }

    pub fn normalize(&self, raw: f64) -> f64 {
        let span = self.high - self.low;
        if !span.is_finite() || span <= f64::EPSILON {
            // Flat training distribution: only strictly worse than everything seen counts
            return if raw > self.high + 1e-12 { 1.0 } else { 0.0 };
        }
        ((raw - self.low) / span).clamp(0.0, 1.0)
    }
}

/// Linear-interpolated percentile over already sorted values, q in [0, 1]
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub(crate) fn check_width(kind: DetectorKind, features: &FeatureMatrix) -> Result<(), DetectorError> {
    if !features.is_compatible() {
        return Err(DetectorError::WidthMismatch {
            detector: kind,
            expected: FEATURE_COUNT,
            actual: features.width(),
        });
    }
    Ok(())
}

pub(crate) fn check_training_rows(kind: DetectorKind, rows: usize) -> Result<(), DetectorError> {
    if rows < MIN_TRAINING_ROWS {
        return Err(DetectorError::InsufficientData {
            detector: kind,
            rows,
            required: MIN_TRAINING_ROWS,
        });
    }
    Ok(())
}
