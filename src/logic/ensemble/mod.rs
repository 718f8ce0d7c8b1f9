//! Ensemble Module - Weighted fusion and severity tiers
//!
//! Kết hợp điểm của các detector thành một điểm duy nhất.

pub mod weights;
pub mod severity;
pub mod fusion;

pub use weights::EnsembleWeights;
pub use severity::{SeverityBands, SeverityTier};
pub use fusion::{fuse, DetectorContribution, FusedScore};
