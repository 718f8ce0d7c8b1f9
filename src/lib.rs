//! Sentinel Core - offline hybrid anomaly scoring for security logs
//!
//! ```ignore
//! use sentinel_core::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default().with_env_overrides())?;
//! let report = engine.analyze(&records)?;
//! for result in report.flagged() {
//!     log::warn!("{}: {}", result.record_id, result.explanation);
//! }
//! engine.shutdown();
//! ```

pub mod constants;
pub mod logic;

pub use logic::config::{ConfigError, EngineConfig};
pub use logic::detectors::{Detector, DetectorKind, DetectorResult};
pub use logic::engine::{AbortSignal, Engine, EngineError, ResultSink, RunOptions, RunProgress, RunReport};
pub use logic::ensemble::SeverityTier;
pub use logic::explain::AnomalyResult;
pub use logic::records::LogRecord;
