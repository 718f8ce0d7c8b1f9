use crate::logic::config::ConfigError;
use crate::logic::detectors::DetectorKind;
use crate::logic::explain::AnomalyResult;

/// Run-level failures. Everything per-record or per-detector is recovered
/// inside the run and never shows up here.
#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    EmptyBatch,
    /// Every detector failed; mid-run this keeps the chunks already scored
    NoDetectorsAvailable {
        reasons: Vec<(DetectorKind, String)>,
        partial: Vec<AnomalyResult>,
    },
    /// Chunk did not fit even after one retry at half size
    ResourceExhausted {
        needed_bytes: u64,
        budget_bytes: u64,
        partial: Vec<AnomalyResult>,
    },
    Aborted {
        partial: Vec<AnomalyResult>,
    },
}

impl EngineError {
    /// Results produced before the failure, if any
    pub fn partial_results(&self) -> &[AnomalyResult] {
        match self {
            EngineError::NoDetectorsAvailable { partial, .. }
            | EngineError::ResourceExhausted { partial, .. }
            | EngineError::Aborted { partial } => partial,
            _ => &[],
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "{}", e),
            EngineError::EmptyBatch => write!(f, "Input batch is empty"),
            EngineError::NoDetectorsAvailable { reasons, partial } => {
                write!(f, "No detector available for this run")?;
                for (kind, reason) in reasons {
                    write!(f, "; {}: {}", kind, reason)?;
                }
                if !partial.is_empty() {
                    write!(f, " ({} results produced before failure)", partial.len())?;
                }
                Ok(())
            }
            EngineError::ResourceExhausted { needed_bytes, budget_bytes, partial } => write!(
                f,
                "Chunk needs ~{} bytes, budget is {} bytes ({} results produced before failure)",
                needed_bytes,
                budget_bytes,
                partial.len()
            ),
            EngineError::Aborted { partial } => {
                write!(f, "Run aborted after {} results", partial.len())
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}
