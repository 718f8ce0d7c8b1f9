//! Stage timings for a run

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Wall-clock timer for one stage
pub struct StageTimer {
    label: &'static str,
    start: Instant,
}

impl StageTimer {
    pub fn start(label: &'static str) -> Self {
        log::debug!("Starting stage: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop and return elapsed seconds
    pub fn stop(self) -> f64 {
        let secs = self.start.elapsed().as_secs_f64();
        log::debug!("Completed stage: {} in {:.3}s", self.label, secs);
        secs
    }
}

/// Accumulated seconds per stage; chunked runs add up across chunks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub feature_extraction: f64,
    /// Detector name -> training seconds
    pub training: BTreeMap<String, f64>,
    /// Detector name -> scoring seconds
    pub scoring: BTreeMap<String, f64>,
    pub fusion: f64,
    pub explanation: f64,
    pub total: f64,
}

impl StageTimings {
    pub fn add_training(&mut self, detector: &str, secs: f64) {
        *self.training.entry(detector.to_string()).or_insert(0.0) += secs;
    }

    pub fn add_scoring(&mut self, detector: &str, secs: f64) {
        *self.scoring.entry(detector.to_string()).or_insert(0.0) += secs;
    }

    pub fn log_summary(&self) {
        log::info!(
            "Stage timings: extraction {:.3}s, fusion {:.3}s, explanation {:.3}s, total {:.3}s",
            self.feature_extraction,
            self.fusion,
            self.explanation,
            self.total
        );
        for (name, secs) in &self.training {
            log::info!("  train {:<16} {:.3}s", name, secs);
        }
        for (name, secs) in &self.scoring {
            log::info!("  score {:<16} {:.3}s", name, secs);
        }
    }
}
