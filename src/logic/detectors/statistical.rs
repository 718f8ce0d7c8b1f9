//! Statistical Detector
//!
//! Per-feature deviation from training statistics, z-score or IQR.

use std::time::Instant;

use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::logic::features::{feature_name, FEATURE_COUNT};
use crate::logic::governor::ComputeBackend;
use crate::logic::model::{validate_artifact, ModelArtifact};
use super::{
    check_training_rows, check_width, percentile, Detector, DetectorError, DetectorInput, DetectorKind,
    DetectorResult, TrainingSession,
};

/// Stand-in for a zero spread; any deviation from a constant feature saturates
const MIN_SPREAD: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticalMethod {
    ZScore,
    Iqr,
}

impl StatisticalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticalMethod::ZScore => "zscore",
            StatisticalMethod::Iqr => "iqr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum StatisticalState {
    ZScore { means: Vec<f64>, stds: Vec<f64> },
    Iqr { q1: Vec<f64>, q3: Vec<f64>, iqr: Vec<f64> },
}

pub struct StatisticalDetector {
    method: StatisticalMethod,
    threshold: f64,
    state: Option<StatisticalState>,
    trained_rows: usize,
}

impl StatisticalDetector {
    pub fn new(method: StatisticalMethod, threshold: f64) -> Self {
        Self {
            method,
            threshold,
            state: None,
            trained_rows: 0,
        }
    }

    pub fn method(&self) -> StatisticalMethod {
        self.method
    }

    /// (raw, normalized, explanation) for one row
    fn score_row(&self, state: &StatisticalState, row: ArrayView1<'_, f64>) -> (f64, f64, Option<String>) {
        match state {
            StatisticalState::ZScore { means, stds } => {
                let (worst, max_z) = row
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i, ((v - means[i]) / stds[i]).abs()))
                    .fold((0, 0.0), |acc, (i, z)| if z > acc.1 { (i, z) } else { acc });

                let normalized = (max_z / self.threshold).min(1.0);
                let explanation = (max_z > self.threshold).then(|| {
                    format!(
                        "{} deviates {:.1} sd from training mean",
                        feature_name(worst).unwrap_or("feature"),
                        max_z
                    )
                });
                (max_z, normalized, explanation)
            }
            StatisticalState::Iqr { q1, q3, iqr } => {
                let outliers: Vec<usize> = row
                    .iter()
                    .enumerate()
                    .filter(|(i, v)| {
                        **v < q1[*i] - self.threshold * iqr[*i] || **v > q3[*i] + self.threshold * iqr[*i]
                    })
                    .map(|(i, _)| i)
                    .collect();

                let fraction = outliers.len() as f64 / row.len().max(1) as f64;
                let explanation = (!outliers.is_empty()).then(|| {
                    let names: Vec<&str> = outliers.iter().filter_map(|i| feature_name(*i)).take(3).collect();
                    format!("{} features outside IQR fences ({})", outliers.len(), names.join(", "))
                });
                (outliers.len() as f64, fraction, explanation)
            }
        }
    }
}

impl Detector for StatisticalDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Statistical
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::json!({
            "method": self.method.as_str(),
            "threshold": self.threshold,
        })
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn fit(&mut self, input: &DetectorInput) -> Result<TrainingSession, DetectorError> {
        let start = Instant::now();
        let n = input.rows();
        check_width(self.kind(), &input.features)?;
        check_training_rows(self.kind(), n)?;
        log::info!("Training statistical detector ({}) on {} samples", self.method.as_str(), n);

        let x = &input.features.values;
        let state = match self.method {
            StatisticalMethod::ZScore => {
                let means = x.mean_axis(Axis(0)).ok_or(DetectorError::InsufficientData {
                    detector: self.kind(),
                    rows: n,
                    required: 1,
                })?;
                let stds = x.std_axis(Axis(0), 0.0).mapv(|s| if s == 0.0 { MIN_SPREAD } else { s });
                StatisticalState::ZScore {
                    means: means.to_vec(),
                    stds: stds.to_vec(),
                }
            }
            StatisticalMethod::Iqr => {
                let mut q1 = Vec::with_capacity(FEATURE_COUNT);
                let mut q3 = Vec::with_capacity(FEATURE_COUNT);
                for column in x.columns() {
                    let mut sorted = column.to_vec();
                    sorted.sort_by(|a, b| a.total_cmp(b));
                    q1.push(percentile(&sorted, 0.25));
                    q3.push(percentile(&sorted, 0.75));
                }
                let iqr = q1
                    .iter()
                    .zip(q3.iter())
                    .map(|(lo, hi)| if hi - lo == 0.0 { MIN_SPREAD } else { hi - lo })
                    .collect();
                StatisticalState::Iqr { q1, q3, iqr }
            }
        };

        self.state = Some(state);
        self.trained_rows = n;
        log::info!("Statistical detector training complete");

        Ok(TrainingSession::new(
            self.kind(),
            input.population,
            n,
            start.elapsed().as_secs_f64(),
            ComputeBackend::Scalar,
        ))
    }

    fn score(&self, input: &DetectorInput) -> Result<Vec<DetectorResult>, DetectorError> {
        let state = self.state.as_ref().ok_or(DetectorError::NotFitted(self.kind()))?;
        check_width(self.kind(), &input.features)?;

        let results = input
            .features
            .values
            .rows()
            .into_iter()
            .zip(input.record_ids.iter())
            .map(|(row, id)| {
                let (raw, normalized, explanation) = self.score_row(state, row);
                let result = DetectorResult::new(id, self.kind(), raw, normalized);
                match explanation {
                    Some(text) => result.with_explanation(text),
                    None => result,
                }
            })
            .collect();
        Ok(results)
    }

    fn serialize(&self) -> Result<ModelArtifact, DetectorError> {
        let state = self.state.as_ref().ok_or(DetectorError::NotFitted(self.kind()))?;
        Ok(ModelArtifact::build(
            self.kind(),
            FEATURE_COUNT,
            self.hyperparameters(),
            self.trained_rows,
            state,
        )?)
    }

    fn restore(&mut self, artifact: &ModelArtifact) -> bool {
        if let Err(e) = validate_artifact(artifact, &self.expectation()) {
            log::warn!("Statistical artifact rejected: {}", e);
            return false;
        }
        let decoded = artifact.decode_state::<StatisticalState>();
        let state = match (self.method, decoded) {
            (StatisticalMethod::ZScore, Ok(s @ StatisticalState::ZScore { .. })) => s,
            (StatisticalMethod::Iqr, Ok(s @ StatisticalState::Iqr { .. })) => s,
            (_, Ok(_)) => return false,
            (_, Err(e)) => {
                log::warn!("Statistical artifact undecodable: {}", e);
                return false;
            }
        };
        self.state = Some(state);
        self.trained_rows = artifact.sample_size;
        true
    }
}
