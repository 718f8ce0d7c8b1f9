//! Severity tiers over fused scores

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SEVERITY_BANDS;

/// Float noise allowed when a score sits on a cut point
const BAND_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Low => "LOW",
            SeverityTier::Medium => "MEDIUM",
            SeverityTier::High => "HIGH",
            SeverityTier::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive lower bounds for LOW, MEDIUM, HIGH, CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    cuts: [f64; 4],
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self { cuts: DEFAULT_SEVERITY_BANDS }
    }
}

impl SeverityBands {
    /// Falls back to defaults unless given 4 strictly increasing cuts
    pub fn from_cuts(cuts: &[f64]) -> Self {
        let valid = cuts.len() == 4 && cuts.windows(2).all(|w| w[0] < w[1]);
        if !valid {
            log::warn!("Invalid severity bands {:?}, using defaults", cuts);
            return Self::default();
        }
        Self {
            cuts: [cuts[0], cuts[1], cuts[2], cuts[3]],
        }
    }

    pub fn cuts(&self) -> [f64; 4] {
        self.cuts
    }

    /// None below the LOW cut. A score on a cut belongs to the higher tier.
    pub fn tier_for(&self, score: f64) -> Option<SeverityTier> {
        let tiers = [
            SeverityTier::Critical,
            SeverityTier::High,
            SeverityTier::Medium,
            SeverityTier::Low,
        ];
        tiers
            .into_iter()
            .zip(self.cuts.iter().rev())
            .find(|(_, cut)| score + BAND_TOLERANCE >= **cut)
            .map(|(tier, _)| tier)
    }
}
