//! Features Module - Feature Extraction Engine
//!
//! Tách logic trích xuất features khỏi detectors.
//! Layout, patterns and batch profile live here; detectors only see the matrix.

pub mod layout;
pub mod patterns;
pub mod profile;
pub mod matrix;
pub mod extractor;


// Re-export common types
pub use layout::{feature_name, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION, layout_hash};
pub use matrix::FeatureMatrix;
pub use profile::FrequencyProfile;
pub use extractor::{ExtractedBatch, FeatureExtractionError, FeatureExtractor};
