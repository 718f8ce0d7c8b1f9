//! Logic Module - Scoring core
//!
//! Chứa các engine xử lý: Features, Detectors, Ensemble, Explain.
//!
//! ## Layout
//! - `records` - Input log records (already parsed by ingestion)
//! - `config` - Engine configuration and validation
//! - `features/` - Fixed-width feature extraction
//! - `detectors/` - Tree partition, boundary, statistical, keyword scorers
//! - `model/` - Artifact persistence and staleness checks
//! - `governor/` - Backend detection, chunking, memory budget, worker pool
//! - `ensemble/` - Weighted fusion and severity tiers
//! - `explain/` - Explanations and contextual threat score
//! - `engine/` - Orchestrates one analysis run

pub mod records;
pub mod config;

pub mod features;
pub mod detectors;
pub mod model;
pub mod governor;
pub mod ensemble;
pub mod explain;
pub mod engine;
