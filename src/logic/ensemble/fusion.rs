//! Weighted fusion of per-detector scores

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::logic::detectors::{DetectorKind, DetectorResult};

/// One detector's share of a fused score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorContribution {
    pub detector: DetectorKind,
    /// Effective weight after redistribution
    pub weight: f64,
    pub normalized_score: f64,
    /// weight * normalized_score
    pub contribution: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub score: f64,
    /// Largest contribution first
    pub contributions: Vec<DetectorContribution>,
}

/// Fuse detector outputs row by row.
///
/// `outputs` holds one full-length result vector per available detector.
/// A row-level `failed` result drops that detector for that row only, and the
/// row's weights are rescaled over the detectors that did answer.
pub fn fuse(
    outputs: &[(DetectorKind, Vec<DetectorResult>)],
    weights: &BTreeMap<DetectorKind, f64>,
    rows: usize,
) -> Vec<FusedScore> {
    (0..rows)
        .map(|row| {
            let answered: Vec<(DetectorKind, &DetectorResult, f64)> = outputs
                .iter()
                .filter_map(|(kind, results)| {
                    let result = results.get(row)?;
                    let weight = weights.get(kind).copied()?;
                    (!result.failed).then_some((*kind, result, weight))
                })
                .collect();

            let total: f64 = answered.iter().map(|(_, _, w)| w).sum();
            if answered.is_empty() || total <= 0.0 {
                return FusedScore {
                    score: 0.0,
                    contributions: Vec::new(),
                };
            }

            let mut contributions: Vec<DetectorContribution> = answered
                .into_iter()
                .map(|(detector, result, weight)| {
                    let weight = weight / total;
                    let normalized_score = result.normalized_score.clamp(0.0, 1.0);
                    DetectorContribution {
                        detector,
                        weight,
                        normalized_score,
                        contribution: weight * normalized_score,
                        explanation: result.explanation.clone(),
                    }
                })
                .collect();

            let score = contributions.iter().map(|c| c.contribution).sum::<f64>().clamp(0.0, 1.0);
            contributions.sort_by(|a, b| {
                b.contribution
                    .total_cmp(&a.contribution)
                    .then_with(|| a.detector.cmp(&b.detector))
            });

            FusedScore { score, contributions }
        })
        .collect()
}
