use serde::{Deserialize, Serialize};

use crate::logic::detectors::DetectorKind;
use crate::logic::ensemble::{DetectorContribution, SeverityTier};

/// Terminal per-record output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub record_id: String,
    /// Fused score in [0, 1]
    pub score: f64,
    /// None = below the lowest band, not flagged
    pub severity: Option<SeverityTier>,
    /// Largest contribution first
    pub contributions: Vec<DetectorContribution>,
    pub explanation: String,
    pub reasons: Vec<String>,
    /// Suspicious phrases found in the message
    pub matched_terms: Vec<String>,
    /// Context-adjusted 0-100 score
    pub threat_score: f64,
    pub threat_multiplier: f64,
}

impl AnomalyResult {
    pub fn is_flagged(&self) -> bool {
        self.severity.is_some()
    }

    pub fn top_detector(&self) -> Option<DetectorKind> {
        self.contributions.first().map(|c| c.detector)
    }

    /// Sum of effective weights; 1 whenever any detector answered
    pub fn weight_sum(&self) -> f64 {
        self.contributions.iter().map(|c| c.weight).sum()
    }
}
