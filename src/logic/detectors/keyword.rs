//! Keyword / Rule Detector
//!
//! Deterministic phrase matching against the raw message text. Score is the
//! heaviest matched term; every matched term is reported. No training.

use std::time::Instant;

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::logic::features::FEATURE_COUNT;
use crate::logic::governor::ComputeBackend;
use crate::logic::model::{validate_artifact, ModelArtifact};
use super::{Detector, DetectorError, DetectorInput, DetectorKind, DetectorResult, TrainingSession};

/// Bump when the table changes so persisted rule artifacts go stale
const RULES_VERSION: u32 = 1;

/// Suspicious phrase -> weight
pub const SUSPICIOUS_KEYWORDS: &[(&str, f64)] = &[
    ("failed password", 0.95),
    ("authentication failed", 0.95),
    ("invalid user", 0.95),
    ("sasl login authentication failed", 0.95),
    ("suspicious command", 0.98),
    ("failed mfa", 0.97),
    ("unauthorized", 0.93),
    ("brute force", 0.96),
    ("rootkit", 1.0),
    ("malware", 1.0),
    ("failed", 0.80),
    ("error", 0.75),
    ("disconnect", 0.72),
    ("warning", 0.70),
    ("denied", 0.78),
    ("reject", 0.76),
    ("blocked", 0.74),
    ("sudo", 0.60),
    ("root", 0.62),
    ("admin", 0.58),
    ("privilege", 0.65),
    ("connect from unknown", 0.68),
    ("accepted publickey", 0.35),
    ("started session", 0.25),
    ("cmd", 0.30),
    ("container started", 0.28),
    ("user login succeeded", 0.30),
];

static KEYWORD_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(SUSPICIOUS_KEYWORDS.iter().map(|(kw, _)| regex::escape(kw)))
        .expect("static suspicious keyword set")
});

/// Matched terms in an already-lowercased message, heaviest first
pub fn matched_terms(message_lower: &str) -> Vec<(&'static str, f64)> {
    let mut terms: Vec<(&'static str, f64)> = KEYWORD_SET
        .matches(message_lower)
        .iter()
        .map(|i| SUSPICIOUS_KEYWORDS[i])
        .collect();
    terms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    terms
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RuleTable {
    version: u32,
    rules: Vec<(String, f64)>,
}

#[derive(Debug, Default)]
pub struct KeywordDetector;

impl KeywordDetector {
    pub fn new() -> Self {
        Self
    }

    fn table() -> RuleTable {
        RuleTable {
            version: RULES_VERSION,
            rules: SUSPICIOUS_KEYWORDS.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
        }
    }
}

impl Detector for KeywordDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Keyword
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::json!({
            "rules_version": RULES_VERSION,
            "rule_count": SUSPICIOUS_KEYWORDS.len(),
        })
    }

    fn is_fitted(&self) -> bool {
        true
    }

    fn requires_training(&self) -> bool {
        false
    }

    /// Nothing to learn; reports an empty session
    fn fit(&mut self, input: &DetectorInput) -> Result<TrainingSession, DetectorError> {
        let start = Instant::now();
        Ok(TrainingSession::new(
            self.kind(),
            input.population,
            0,
            start.elapsed().as_secs_f64(),
            ComputeBackend::Scalar,
        ))
    }

    fn score(&self, input: &DetectorInput) -> Result<Vec<DetectorResult>, DetectorError> {
        let results = input
            .texts
            .iter()
            .zip(input.record_ids.iter())
            .map(|(text, id)| {
                let terms = matched_terms(text);
                match terms.first() {
                    Some((_, top)) => {
                        let names: Vec<&str> = terms.iter().map(|(t, _)| *t).collect();
                        DetectorResult::new(id, self.kind(), *top, *top)
                            .with_explanation(format!("matched terms: {}", names.join(", ")))
                    }
                    None => DetectorResult::new(id, self.kind(), 0.0, 0.0),
                }
            })
            .collect();
        Ok(results)
    }

    fn serialize(&self) -> Result<ModelArtifact, DetectorError> {
        Ok(ModelArtifact::build(
            self.kind(),
            FEATURE_COUNT,
            self.hyperparameters(),
            0,
            &Self::table(),
        )?)
    }

    fn restore(&mut self, artifact: &ModelArtifact) -> bool {
        if let Err(e) = validate_artifact(artifact, &self.expectation()) {
            log::warn!("Keyword artifact rejected: {}", e);
            return false;
        }
        matches!(artifact.decode_state::<RuleTable>(), Ok(table) if table == Self::table())
    }
}
