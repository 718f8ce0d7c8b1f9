//! Tree-Partition Detector (isolation forest)
//!
//! Anomalies are easier to isolate and thus have shorter path lengths in
//! random partition trees. Raw score is `2^(-E[h] / c(psi))`; the normalized
//! score is calibrated against the training raw scores.

use std::time::Instant;

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::logic::features::FEATURE_COUNT;
use crate::logic::governor::ComputeBackend;
use crate::logic::model::{validate_artifact, ModelArtifact};
use super::{
    check_training_rows, check_width, Detector, DetectorError, DetectorInput, DetectorKind, DetectorResult,
    ScoreCalibration, TrainingSession,
};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Smallest raw-score distance between "typical" and "certainly anomalous".
/// Raw scores sit near 0.5 for unremarkable rows; a batch whose spread is
/// narrower than this has nothing that isolates markedly faster.
const MIN_CALIBRATION_SPAN: f64 = 0.15;

/// Node in an isolation tree; children are indices into the tree's node arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    /// nodes[0] is the root
    nodes: Vec<IsolationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ForestState {
    trees: Vec<IsolationTree>,
    /// Rows actually drawn per tree
    tree_sample_size: usize,
    calibration: ScoreCalibration,
    trained_rows: usize,
}

pub struct TreePartitionDetector {
    n_trees: usize,
    sample_size: usize,
    seed: u64,
    state: Option<ForestState>,
}

impl TreePartitionDetector {
    pub fn new(n_trees: usize, sample_size: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            sample_size: sample_size.max(2),
            seed,
            state: None,
        }
    }

    /// c(n): average path length of an unsuccessful BST search
    pub fn average_path_length(n: usize) -> f64 {
        match n {
            0 | 1 => 0.0,
            2 => 1.0,
            _ => {
                let n = n as f64;
                2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
            }
        }
    }

    fn mean_path_length(state: &ForestState, sample: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = state.trees.iter().map(|tree| tree.path_length(sample)).sum();
        total / state.trees.len().max(1) as f64
    }

    fn raw_score(state: &ForestState, sample: ArrayView1<'_, f64>) -> f64 {
        let c = Self::average_path_length(state.tree_sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2.0_f64.powf(-Self::mean_path_length(state, sample) / c)
    }
}

impl IsolationTree {
    fn build<R: Rng>(data: ArrayView2<'_, f64>, rows: &[usize], max_depth: usize, rng: &mut R) -> Self {
        let mut nodes = Vec::new();
        Self::build_node(&mut nodes, data, rows, 0, max_depth, rng);
        Self { nodes }
    }

    fn build_node<R: Rng>(
        nodes: &mut Vec<IsolationNode>,
        data: ArrayView2<'_, f64>,
        rows: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> usize {
        let id = nodes.len();
        nodes.push(IsolationNode::Leaf { size: rows.len() });

        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|f| {
                let (min, max) = rows.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &r| {
                    let v = data[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (max - min > f64::EPSILON).then_some((f, min, max))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature_idx, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let split_value = rng.gen_range(min..max);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| data[[r, feature_idx]] < split_value);

        let left = Self::build_node(nodes, data, &left_rows, depth + 1, max_depth, rng);
        let right = Self::build_node(nodes, data, &right_rows, depth + 1, max_depth, rng);
        nodes[id] = IsolationNode::Internal {
            feature_idx,
            split_value,
            left,
            right,
        };
        id
    }

    fn path_length(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut node = 0;
        let mut depth = 0usize;
        loop {
            match self.nodes.get(node) {
                Some(IsolationNode::Internal { feature_idx, split_value, left, right }) => {
                    let val = sample.get(*feature_idx).copied().unwrap_or(0.0);
                    node = if val < *split_value { *left } else { *right };
                    depth += 1;
                }
                Some(IsolationNode::Leaf { size }) => {
                    // Unbuilt subtree below a capped leaf
                    return depth as f64 + TreePartitionDetector::average_path_length(*size);
                }
                None => return depth as f64,
            }
        }
    }
}

impl Detector for TreePartitionDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::TreePartition
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::json!({
            "n_trees": self.n_trees,
            "sample_size": self.sample_size,
            "seed": self.seed,
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

        let data = input.features.values.view();
        let psi = self.sample_size.min(n);
        let max_depth = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let trees: Vec<IsolationTree> = (0..self.n_trees)
            .map(|_| {
                let rows = index::sample(&mut rng, n, psi).into_vec();
                IsolationTree::build(data, &rows, max_depth, &mut rng)
            })
            .collect();

        let mut state = ForestState {
            trees,
            tree_sample_size: psi,
            calibration: ScoreCalibration { low: 0.0, high: 1.0 },
            trained_rows: n,
        };
        let raw: Vec<f64> = data.rows().into_iter().map(|row| Self::raw_score(&state, row)).collect();
        state.calibration = ScoreCalibration::from_training(&raw, MIN_CALIBRATION_SPAN);

        log::info!(
            "Tree partition trained: {} trees x {} rows (of {}), calibration [{:.4}, {:.4}]",
            self.n_trees,
            psi,
            n,
            state.calibration.low,
            state.calibration.high
        );
        self.state = Some(state);

        Ok(TrainingSession::new(
            self.kind(),
            input.population,
            psi,
            start.elapsed().as_secs_f64(),
            ComputeBackend::Scalar,
        ))
    }

    fn score(&self, input: &DetectorInput) -> Result<Vec<DetectorResult>, DetectorError> {
        let state = self.state.as_ref().ok_or(DetectorError::NotFitted(self.kind()))?;
        check_width(self.kind(), &input.features)?;

        let expected = Self::average_path_length(state.tree_sample_size);
        let results = input
            .features
            .values
            .rows()
            .into_iter()
            .zip(input.record_ids.iter())
            .map(|(row, id)| {
                let path = Self::mean_path_length(state, row);
                let raw = if expected > 0.0 { 2.0_f64.powf(-path / expected) } else { 0.5 };
                DetectorResult::new(id, self.kind(), raw, state.calibration.normalize(raw)).with_explanation(format!(
                    "isolated after {:.2} splits on average (typical {:.2})",
                    path, expected
                ))
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
            state.tree_sample_size,
            state,
        )?)
    }

    fn restore(&mut self, artifact: &ModelArtifact) -> bool {
        if let Err(e) = validate_artifact(artifact, &self.expectation()) {
            log::warn!("Tree partition artifact rejected: {}", e);
            return false;
        }
        match artifact.decode_state::<ForestState>() {
            Ok(state) if !state.trees.is_empty() => {
                self.state = Some(state);
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::warn!("Tree partition artifact undecodable: {}", e);
                false
            }
        }
    }
}
