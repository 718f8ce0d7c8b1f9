//! Central Configuration Constants
//!
//! Single source of truth for all engine defaults.
//! To change a default cap or band, only edit this file.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Sentinel";

/// Directory name under the local data dir
pub const APP_DIR_NAME: &str = "sentinel";

// ============================================
// Ensemble defaults
// ============================================

pub const DEFAULT_WEIGHT_TREE_PARTITION: f64 = 0.35;
pub const DEFAULT_WEIGHT_BOUNDARY: f64 = 0.25;
pub const DEFAULT_WEIGHT_STATISTICAL: f64 = 0.20;
pub const DEFAULT_WEIGHT_KEYWORD: f64 = 0.20;

/// Severity cut points: LOW, MEDIUM, HIGH, CRITICAL (inclusive lower bounds)
pub const DEFAULT_SEVERITY_BANDS: [f64; 4] = [0.35, 0.55, 0.75, 0.90];

// ============================================
// Resource defaults
// ============================================

/// Max training rows for the boundary detector
pub const DEFAULT_BOUNDARY_SAMPLE_CAP: usize = 10_000;

/// Batches above this size are processed in chunks
pub const DEFAULT_LARGE_DATASET_THRESHOLD: usize = 100_000;

/// Chunk size used once chunking is enabled
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Per-task timeout for detector fit/score
pub const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 120_000;

/// Share of available memory a single chunk may claim
pub const DEFAULT_MEMORY_BUDGET_FRACTION: f64 = 0.5;

pub const DEFAULT_RANDOM_SEED: u64 = 42;

// ============================================
// Detector hyperparameter defaults
// ============================================

pub const DEFAULT_TREE_COUNT: usize = 100;
pub const DEFAULT_TREE_SAMPLE_SIZE: usize = 256;
pub const DEFAULT_BOUNDARY_NU: f64 = 0.01;
pub const DEFAULT_BOUNDARY_SUPPORT_VECTORS: usize = 256;
pub const DEFAULT_STATISTICAL_THRESHOLD: f64 = 3.0;

/// Artifact on-disk format version
pub const MODEL_FORMAT_VERSION: u32 = 1;

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Boundary detector sample cap from environment or default
pub fn get_boundary_sample_cap() -> usize {
    env_positive("SENTINEL_SVM_MAX_SAMPLES").unwrap_or(DEFAULT_BOUNDARY_SAMPLE_CAP)
}

/// Large dataset threshold from environment or default
pub fn get_large_dataset_threshold() -> usize {
    env_positive("SENTINEL_LARGE_DATASET_THRESHOLD").unwrap_or(DEFAULT_LARGE_DATASET_THRESHOLD)
}

/// Random seed from environment or default
pub fn get_random_seed() -> u64 {
    std::env::var("SENTINEL_RANDOM_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RANDOM_SEED)
}

/// Check if retraining is forced from the environment
pub fn is_force_retrain() -> bool {
    std::env::var("SENTINEL_FORCE_RETRAIN")
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse a strictly positive integer; zero or garbage falls back to the default
fn env_positive(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}
