//! Ensemble weights and proportional redistribution

use std::collections::BTreeMap;

use crate::logic::config::EngineConfig;
use crate::logic::detectors::DetectorKind;

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleWeights {
    base: BTreeMap<DetectorKind, f64>,
}

impl EnsembleWeights {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::from_map(
            DetectorKind::ALL
                .iter()
                .map(|k| (*k, config.weight_for(*k)))
                .collect(),
        )
    }

    pub fn from_map(base: BTreeMap<DetectorKind, f64>) -> Self {
        Self { base }
    }

    pub fn base(&self, kind: DetectorKind) -> f64 {
        self.base.get(&kind).copied().unwrap_or(0.0)
    }

    /// Detectors worth running: configured with a positive weight
    pub fn active(&self) -> Vec<DetectorKind> {
        self.base
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Weights over the available detectors, scaled to sum to 1.
    /// None when nothing is available.
    pub fn redistribute(&self, available: &[DetectorKind]) -> Option<BTreeMap<DetectorKind, f64>> {
        if available.is_empty() {
            return None;
        }

        let total: f64 = available.iter().map(|k| self.base(*k)).sum();
        let weights = if total > 0.0 {
            available.iter().map(|k| (*k, self.base(*k) / total)).collect()
        } else {
            // Only zero-weight detectors left: split evenly
            let even = 1.0 / available.len() as f64;
            available.iter().map(|k| (*k, even)).collect()
        };
        Some(weights)
    }
}
