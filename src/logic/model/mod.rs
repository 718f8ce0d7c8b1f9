//! Model Module - Persistence of trained detector state
//!
//! Tách persistence khỏi detectors.
//! Artifact format, validation rules and on-disk store.

pub mod artifact;
pub mod validate;
pub mod storage;

#[cfg(test)]
mod tests;

// Re-export common types
pub use artifact::ModelArtifact;
pub use validate::{validate_artifact, ArtifactExpectation, ModelError, StaleReason};
pub use storage::{LoadOutcome, ModelStore};
