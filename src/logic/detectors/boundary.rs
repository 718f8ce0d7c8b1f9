//! Boundary / Novelty Detector
//!
//! One-class density boundary: features are standardized on the training
//! sample, an RBF kernel density is estimated over a seeded support set, and
//! the boundary `rho` is the `nu`-quantile of training densities. Records
//! whose density falls below `rho` lie outside the learned region.
//!
//! Training cost grows with the sample, so the sample is capped and drawn
//! stratified by record severity.

use std::time::Instant;

use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::logic::features::{feature_name, FEATURE_COUNT};
use crate::logic::governor::{ComputeBackend, KernelBackend};
use crate::logic::model::{validate_artifact, ModelArtifact};
use super::sampling::sample_training_rows;
use super::{
    check_training_rows, check_width, percentile, Detector, DetectorError, DetectorInput, DetectorKind,
    DetectorResult, ScoreCalibration, TrainingSession,
};

const MIN_SCALE: f64 = 1e-12;

/// Calibration span floor as a share of the median training density: a row
/// only reaches 1 once it is this much sparser than a typical row.
const MIN_RELATIVE_SPAN: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BoundaryState {
    mean: Vec<f64>,
    scale: Vec<f64>,
    /// Standardized support rows
    support: Vec<Vec<f64>>,
    gamma: f64,
    rho: f64,
    calibration: ScoreCalibration,
    sample_size: usize,
    trained_rows: usize,
}

pub struct BoundaryDetector {
    sample_cap: usize,
    support_vectors: usize,
    nu: f64,
    seed: u64,
    backend: ComputeBackend,
    state: Option<BoundaryState>,
}

impl BoundaryDetector {
    pub fn new(sample_cap: usize, support_vectors: usize, nu: f64, seed: u64, backend: ComputeBackend) -> Self {
        Self {
            sample_cap: sample_cap.max(1),
            support_vectors: support_vectors.max(1),
            nu,
            seed,
            backend,
            state: None,
        }
    }

    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }

    fn standardize(state: &BoundaryState, row: ArrayView1<'_, f64>, out: &mut [f64]) {
        for (i, v) in row.iter().enumerate().take(out.len()) {
            out[i] = (v - state.mean[i]) / state.scale[i];
        }
    }

    fn density(state: &BoundaryState, kernel: &dyn KernelBackend, z: &[f64]) -> f64 {
        if state.support.is_empty() {
            return 0.0;
        }
        let sum: f64 = state
            .support
            .iter()
            .map(|s| (-state.gamma * kernel.squared_distance(z, s)).exp())
            .sum();
        sum / state.support.len() as f64
    }

    /// Feature with the largest standardized deviation
    fn top_deviation(z: &[f64]) -> Option<(usize, f64)> {
        z.iter()
            .enumerate()
            .map(|(i, v)| (i, *v))
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    }
}

impl Detector for BoundaryDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Boundary
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::json!({
            "kernel": "rbf",
            "gamma": "auto",
            "nu": self.nu,
            "sample_cap": self.sample_cap,
            "support_vectors": self.support_vectors,
            "seed": self.seed,
            "backend": self.backend.as_str(),
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

        let sample = sample_training_rows(n, self.sample_cap, self.seed, Some(&input.labels));
        let population = input.population.max(n);
        log::info!(
            "Boundary detector training on {} / {} rows ({:.1}%)",
            sample.used(),
            population,
            sample.used() as f64 / population as f64 * 100.0
        );

        let x = input.features.select_rows(&sample.indices);
        let failed = |reason: &str| DetectorError::Failed {
            detector: DetectorKind::Boundary,
            reason: reason.to_string(),
        };
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| failed("empty training sample"))?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > MIN_SCALE { s } else { 1.0 });

        let mut z: Array2<f64> = &x - &mean.view().insert_axis(Axis(0));
        z /= &scale.view().insert_axis(Axis(0));
        drop(x);

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));
        let support_rows: Vec<usize> = if z.nrows() <= self.support_vectors {
            (0..z.nrows()).collect()
        } else {
            let mut picked = index::sample(&mut rng, z.nrows(), self.support_vectors).into_vec();
            picked.sort_unstable();
            picked
        };
        let support: Vec<Vec<f64>> = support_rows.iter().map(|&r| z.row(r).to_vec()).collect();

        let mut state = BoundaryState {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
            support,
            gamma: 1.0 / FEATURE_COUNT as f64,
            rho: 0.0,
            calibration: ScoreCalibration { low: 0.0, high: 1.0 },
            sample_size: sample.used(),
            trained_rows: n,
        };

        let kernel = self.backend.kernel();
        let mut densities: Vec<f64> = z
            .rows()
            .into_iter()
            .map(|row| match row.as_slice() {
                Some(slice) => Self::density(&state, kernel, slice),
                None => Self::density(&state, kernel, &row.to_vec()),
            })
            .collect();
        densities.sort_by(|a, b| a.total_cmp(b));
        state.rho = percentile(&densities, self.nu);

        let raw: Vec<f64> = densities.iter().map(|d| state.rho - d).collect();
        let min_span = MIN_RELATIVE_SPAN * percentile(&densities, 0.5);
        state.calibration = ScoreCalibration::from_training(&raw, min_span);

        log::debug!(
            "Boundary fitted: {} support rows, rho {:.6}, kernel path {}",
            state.support.len(),
            state.rho,
            kernel.name()
        );
        let sample_size = state.sample_size;
        self.state = Some(state);

        Ok(TrainingSession::new(
            self.kind(),
            population,
            sample_size,
            start.elapsed().as_secs_f64(),
            self.backend,
        ))
    }

    fn score(&self, input: &DetectorInput) -> Result<Vec<DetectorResult>, DetectorError> {
        let state = self.state.as_ref().ok_or(DetectorError::NotFitted(self.kind()))?;
        check_width(self.kind(), &input.features)?;

        let kernel = self.backend.kernel();
        let mut z = vec![0.0; FEATURE_COUNT];
        let mut results = Vec::with_capacity(input.rows());

        for (row, id) in input.features.values.rows().into_iter().zip(input.record_ids.iter()) {
            Self::standardize(state, row, &mut z);
            let density = Self::density(state, kernel, &z);
            let raw = state.rho - density;

            let mut result = DetectorResult::new(id, self.kind(), raw, state.calibration.normalize(raw));
            if density < state.rho {
                let detail = Self::top_deviation(&z)
                    .and_then(|(i, dev)| feature_name(i).map(|name| format!(", largest deviation {} ({:+.1} sd)", name, dev)))
                    .unwrap_or_default();
                result = result.with_explanation(format!("outside learned boundary{}", detail));
            }
            results.push(result);
        }
        Ok(results)
    }

    fn serialize(&self) -> Result<ModelArtifact, DetectorError> {
        let state = self.state.as_ref().ok_or(DetectorError::NotFitted(self.kind()))?;
        Ok(ModelArtifact::build(
            self.kind(),
            FEATURE_COUNT,
            self.hyperparameters(),
            state.sample_size,
            state,
        )?)
    }

    fn restore(&mut self, artifact: &ModelArtifact) -> bool {
        if let Err(e) = validate_artifact(artifact, &self.expectation()) {
            log::warn!("Boundary artifact rejected: {}", e);
            return false;
        }
        match artifact.decode_state::<BoundaryState>() {
            Ok(state) if state.mean.len() == FEATURE_COUNT && state.scale.len() == FEATURE_COUNT => {
                self.state = Some(state);
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::warn!("Boundary artifact undecodable: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::FeatureMatrix;

    fn input_from(values: Array2<f64>, labels: Vec<Option<String>>) -> DetectorInput {
        let n = values.nrows();
        DetectorInput {
            record_ids: (0..n).map(|i| format!("r{}", i)).collect(),
            features: FeatureMatrix::new(values),
            texts: vec![String::new(); n],
            sources: vec![String::new(); n],
            labels,
            population: n,
        }
    }

    fn grid(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, FEATURE_COUNT), |(i, f)| ((i * 13 + f * 7) % 10) as f64 * 0.1)
    }

    #[test]
    fn test_sample_is_capped_exactly() {
        let labels: Vec<Option<String>> = (0..500)
            .map(|i| Some(if i % 10 == 0 { "HIGH" } else { "INFO" }.to_string()))
            .collect();
        let input = input_from(grid(500), labels);
        let mut detector = BoundaryDetector::new(100, 32, 0.05, 42, ComputeBackend::Scalar);

        let session = detector.fit(&input).unwrap();
        assert_eq!(session.input_size, 500);
        assert_eq!(session.sample_size, 100);
        assert!((session.sampled_fraction() - 0.2).abs() < 1e-12);
        assert_eq!(session.backend, ComputeBackend::Scalar);
    }

    #[test]
    fn test_fraction_is_reported_against_population() {
        let labels: Vec<Option<String>> = vec![Some("INFO".to_string()); 500];
        let input = input_from(grid(500), labels).with_population(2_000);
        let mut detector = BoundaryDetector::new(100, 32, 0.05, 42, ComputeBackend::Scalar);
        let session = detector.fit(&input).unwrap();
        assert_eq!(session.input_size, 2_000);
        assert_eq!(session.sample_size, 100);
        assert!((session.sampled_fraction() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_far_point_is_outside_boundary() {
        let mut values = grid(120);
        for f in 0..FEATURE_COUNT {
            values[[119, f]] = 25.0;
        }
        let input = input_from(values, vec![None; 120]);
        let mut detector = BoundaryDetector::new(1000, 256, 0.01, 1, ComputeBackend::Scalar);
        detector.fit(&input).unwrap();

        let results = detector.score(&input).unwrap();
        assert_eq!(results[119].normalized_score, 1.0);
        assert!(results[119].explanation.as_deref().unwrap().starts_with("outside learned boundary"));
        let median_like = results[..119].iter().filter(|r| r.normalized_score == 0.0).count();
        assert!(median_like >= 59);
    }

    #[test]
    fn test_backend_paths_agree() {
        let input = input_from(grid(80), vec![None; 80]);
        let mut scalar = BoundaryDetector::new(1000, 64, 0.05, 9, ComputeBackend::Scalar);
        let mut lanes = BoundaryDetector::new(1000, 64, 0.05, 9, ComputeBackend::Avx2);
        scalar.fit(&input).unwrap();
        lanes.fit(&input).unwrap();

        let a = scalar.score(&input).unwrap();
        let b = lanes.score(&input).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x.raw_score - y.raw_score).abs() < 1e-9);
        }
    }

    #[test]
    fn test_artifact_roundtrip_and_backend_mismatch() {
        let input = input_from(grid(60), vec![None; 60]);
        let mut trained = BoundaryDetector::new(1000, 32, 0.05, 5, ComputeBackend::Scalar);
        trained.fit(&input).unwrap();
        let artifact = trained.serialize().unwrap();

        let mut restored = BoundaryDetector::new(1000, 32, 0.05, 5, ComputeBackend::Scalar);
        assert!(restored.restore(&artifact));
        assert_eq!(trained.score(&input).unwrap(), restored.score(&input).unwrap());

        let mut other_backend = BoundaryDetector::new(1000, 32, 0.05, 5, ComputeBackend::Avx2);
        assert!(!other_backend.restore(&artifact));
    }
}
