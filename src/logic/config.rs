//! Engine Configuration
//!
//! Layering: `Default` -> optional JSON file -> `SENTINEL_*` env overrides -> `validate()`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::logic::detectors::statistical::StatisticalMethod;
use crate::logic::detectors::DetectorKind;

const WEIGHT_TOLERANCE: f64 = 1e-6;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config IO Error: {}", e),
            ConfigError::Parse(e) => write!(f, "Config Parse Error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid Config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Detector name -> weight, must sum to 1
    pub ensemble_weights: BTreeMap<String, f64>,
    pub boundary_detector_sample_cap: usize,
    pub large_dataset_chunk_threshold: usize,
    pub large_dataset_chunk_size: usize,
    /// Inclusive lower bounds for LOW, MEDIUM, HIGH, CRITICAL
    pub severity_bands: Vec<f64>,
    pub force_retrain: bool,
    pub random_seed: u64,

    /// None = `<local data dir>/sentinel/models`
    pub models_dir: Option<PathBuf>,
    pub persist_models: bool,
    pub detector_timeout_ms: u64,
    /// 0 = min(detector count, cores)
    pub max_workers: usize,
    /// Hard memory budget per chunk; None = fraction of available memory
    pub memory_budget_bytes: Option<u64>,
    pub memory_budget_fraction: f64,
    pub allow_acceleration: bool,

    pub statistical_method: StatisticalMethod,
    pub statistical_threshold: f64,
    pub tree_count: usize,
    pub tree_sample_size: usize,
    pub boundary_nu: f64,
    pub boundary_support_vectors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(DetectorKind::TreePartition.as_str().to_string(), DEFAULT_WEIGHT_TREE_PARTITION);
        weights.insert(DetectorKind::Boundary.as_str().to_string(), DEFAULT_WEIGHT_BOUNDARY);
        weights.insert(DetectorKind::Statistical.as_str().to_string(), DEFAULT_WEIGHT_STATISTICAL);
        weights.insert(DetectorKind::Keyword.as_str().to_string(), DEFAULT_WEIGHT_KEYWORD);

        Self {
            ensemble_weights: weights,
            boundary_detector_sample_cap: DEFAULT_BOUNDARY_SAMPLE_CAP,
            large_dataset_chunk_threshold: DEFAULT_LARGE_DATASET_THRESHOLD,
            large_dataset_chunk_size: DEFAULT_CHUNK_SIZE,
            severity_bands: DEFAULT_SEVERITY_BANDS.to_vec(),
            force_retrain: false,
            random_seed: DEFAULT_RANDOM_SEED,
            models_dir: None,
            persist_models: true,
            detector_timeout_ms: DEFAULT_DETECTOR_TIMEOUT_MS,
            max_workers: 0,
            memory_budget_bytes: None,
            memory_budget_fraction: DEFAULT_MEMORY_BUDGET_FRACTION,
            allow_acceleration: true,
            statistical_method: StatisticalMethod::ZScore,
            statistical_threshold: DEFAULT_STATISTICAL_THRESHOLD,
            tree_count: DEFAULT_TREE_COUNT,
            tree_sample_size: DEFAULT_TREE_SAMPLE_SIZE,
            boundary_nu: DEFAULT_BOUNDARY_NU,
            boundary_support_vectors: DEFAULT_BOUNDARY_SUPPORT_VECTORS,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing keys take defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        let config: EngineConfig = serde_json::from_slice(&data)?;
        Ok(config)
    }

    /// Apply `SENTINEL_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if std::env::var("SENTINEL_SVM_MAX_SAMPLES").is_ok() {
            self.boundary_detector_sample_cap = get_boundary_sample_cap();
        }
        if std::env::var("SENTINEL_LARGE_DATASET_THRESHOLD").is_ok() {
            self.large_dataset_chunk_threshold = get_large_dataset_threshold();
        }
        if std::env::var("SENTINEL_RANDOM_SEED").is_ok() {
            self.random_seed = get_random_seed();
        }
        if is_force_retrain() {
            self.force_retrain = true;
        }
        if let Ok(dir) = std::env::var("SENTINEL_MODELS_DIR") {
            if !dir.trim().is_empty() {
                self.models_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ensemble_weights.is_empty() {
            return Err(ConfigError::Invalid("ensemble_weights is empty".to_string()));
        }

        let mut sum = 0.0;
        for (name, weight) in &self.ensemble_weights {
            if DetectorKind::from_name(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown detector '{}'", name)));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::Invalid(format!("weight for '{}' must be >= 0", name)));
            }
            sum += weight;
        }
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::Invalid(format!("ensemble weights sum to {:.6}, expected 1", sum)));
        }

        if self.severity_bands.len() != 4 {
            return Err(ConfigError::Invalid(format!(
                "severity_bands needs 4 cut points, got {}",
                self.severity_bands.len()
            )));
        }
        let mut previous = 0.0;
        for (i, cut) in self.severity_bands.iter().enumerate() {
            if !cut.is_finite() || *cut <= 0.0 || *cut > 1.0 {
                return Err(ConfigError::Invalid(format!("severity band {} out of (0, 1]", cut)));
            }
            if i > 0 && *cut <= previous {
                return Err(ConfigError::Invalid("severity_bands must be strictly increasing".to_string()));
            }
            previous = *cut;
        }

        let positive = [
            ("boundary_detector_sample_cap", self.boundary_detector_sample_cap),
            ("large_dataset_chunk_threshold", self.large_dataset_chunk_threshold),
            ("large_dataset_chunk_size", self.large_dataset_chunk_size),
            ("tree_count", self.tree_count),
            ("tree_sample_size", self.tree_sample_size),
            ("boundary_support_vectors", self.boundary_support_vectors),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }

        if self.detector_timeout_ms == 0 {
            return Err(ConfigError::Invalid("detector_timeout_ms must be > 0".to_string()));
        }
        if !(self.memory_budget_fraction > 0.0 && self.memory_budget_fraction <= 1.0) {
            return Err(ConfigError::Invalid("memory_budget_fraction must be in (0, 1]".to_string()));
        }
        if !(self.boundary_nu > 0.0 && self.boundary_nu < 1.0) {
            return Err(ConfigError::Invalid("boundary_nu must be in (0, 1)".to_string()));
        }
        if !(self.statistical_threshold > 0.0) {
            return Err(ConfigError::Invalid("statistical_threshold must be > 0".to_string()));
        }

        Ok(())
    }

    /// Configured weight for a detector (0 if absent)
    pub fn weight_for(&self, kind: DetectorKind) -> f64 {
        self.ensemble_weights.get(kind.as_str()).copied().unwrap_or(0.0)
    }

    /// Resolved artifact directory
    pub fn resolved_models_dir(&self) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("models")
        })
    }

    pub fn detector_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.detector_timeout_ms)
    }
}

// ============================================================================
// TESTS
// ============================================================================
