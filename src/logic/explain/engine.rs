use ndarray::ArrayView1;

use super::types::AnomalyResult;
use crate::logic::detectors::keyword::matched_terms;
use crate::logic::ensemble::{FusedScore, SeverityBands};
use crate::logic::features::layout::*;
use crate::logic::records::LogRecord;

// Contextual threat multipliers
const HIGH_SEVERITY_BOOST: f64 = 1.2;
const FAILURE_EVENT_BOOST: f64 = 1.15;
const AFTER_HOURS_BOOST: f64 = 1.1;

/// Top contributors named in the explanation text
const TOP_DETECTORS: usize = 2;

const HIGH_SEVERITY_LABELS: &[&str] = &["CRITICAL", "HIGH", "ERROR"];
const FAILURE_EVENT_TOKENS: &[&str] = &["failed", "error", "unauthorized"];

/// Builds the final result for one record from its fused score
pub fn explain(
    record: &LogRecord,
    features: ArrayView1<'_, f64>,
    fused: FusedScore,
    bands: &SeverityBands,
) -> AnomalyResult {
    let message_lower = record.message.to_lowercase();
    let severity = bands.tier_for(fused.score);
    let reasons = feature_reasons(features);
    let terms: Vec<String> = matched_terms(&message_lower)
        .into_iter()
        .map(|(t, _)| t.to_string())
        .collect();
    let (threat_score, threat_multiplier) = threat_score(record, &message_lower, features, fused.score);

    let explanation = match severity {
        Some(tier) => {
            let mut text = format!("Anomaly (score: {:.3}, {})", fused.score, tier);
            if !reasons.is_empty() {
                text.push_str(" - ");
                text.push_str(&reasons.join("; "));
            }
            let top: Vec<String> = fused
                .contributions
                .iter()
                .filter(|c| c.contribution > 0.0)
                .take(TOP_DETECTORS)
                .map(|c| format!("{} {:.3}", c.detector.label(), c.contribution))
                .collect();
            if !top.is_empty() {
                text.push_str(&format!(". Top detectors: {}", top.join(", ")));
            }
            text
        }
        None => format!("No anomaly (score: {:.3})", fused.score),
    };

    AnomalyResult {
        record_id: record.id.clone(),
        score: fused.score,
        severity,
        contributions: fused.contributions,
        explanation,
        reasons,
        matched_terms: terms,
        threat_score,
        threat_multiplier,
    }
}

/// Human-readable signals straight from the feature row
pub fn feature_reasons(features: ArrayView1<'_, f64>) -> Vec<String> {
    let get = |idx: usize| features.get(idx).copied().unwrap_or(0.0);
    let mut reasons = Vec::new();

    if get(IDX_AFTER_HOURS) > 0.0 {
        reasons.push(format!("unusual activity time ({:02}:00)", get(IDX_HOUR) as u32));
    }
    if get(IDX_SEVERITY) >= 4.0 {
        reasons.push("critical/high severity event".to_string());
    }
    if get(IDX_KEYWORD_RISK) >= 0.9 {
        reasons.push("high-risk keywords detected".to_string());
    }
    if get(IDX_FAILURE) > 0.0 && get(IDX_AUTH) > 0.0 {
        reasons.push("authentication failure".to_string());
    }
    if get(IDX_PRIVILEGE) > 0.0 {
        reasons.push("privileged account or command".to_string());
    }
    if get(IDX_EVENT_RARITY) >= 0.9 {
        reasons.push("rare event identifier".to_string());
    }
    if get(IDX_SOURCE_RARITY) >= 0.9 {
        reasons.push("rare source".to_string());
    }
    if get(IDX_TEMPLATE_RARITY) >= 0.95 {
        reasons.push("rare message pattern".to_string());
    }

    reasons
}

/// (0-100 threat score, applied multiplier)
pub fn threat_score(record: &LogRecord, message_lower: &str, features: ArrayView1<'_, f64>, score: f64) -> (f64, f64) {
    let mut multiplier = 1.0;

    let severity = record.severity.as_deref().unwrap_or("").trim().to_ascii_uppercase();
    if HIGH_SEVERITY_LABELS.contains(&severity.as_str()) {
        multiplier *= HIGH_SEVERITY_BOOST;
    }
    if FAILURE_EVENT_TOKENS.iter().any(|t| message_lower.contains(t)) {
        multiplier *= FAILURE_EVENT_BOOST;
    }
    if features.get(IDX_AFTER_HOURS).copied().unwrap_or(0.0) > 0.0 {
        multiplier *= AFTER_HOURS_BOOST;
    }

    let threat = (score * 100.0 * multiplier).min(100.0);
    ((threat * 100.0).round() / 100.0, (multiplier * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::detectors::DetectorKind;
    use crate::logic::ensemble::{DetectorContribution, SeverityTier};
    use ndarray::Array1;

    fn row(pairs: &[(usize, f64)]) -> Array1<f64> {
        let mut values = Array1::zeros(FEATURE_COUNT);
        values[IDX_HOUR] = 12.0;
        for (idx, v) in pairs {
            values[*idx] = *v;
        }
        values
    }

    fn fused(score: f64) -> FusedScore {
        FusedScore {
            score,
            contributions: vec![
                DetectorContribution {
                    detector: DetectorKind::TreePartition,
                    weight: 0.35,
                    normalized_score: 1.0,
                    contribution: 0.35,
                    explanation: None,
                },
                DetectorContribution {
                    detector: DetectorKind::Keyword,
                    weight: 0.20,
                    normalized_score: 0.95,
                    contribution: 0.19,
                    explanation: Some("matched terms: failed password".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_flagged_explanation() {
        let record = LogRecord::new("r1", "2024-05-06T03:00:00Z", "sshd", "Failed password for root")
            .with_severity("HIGH");
        let features = row(&[
            (IDX_HOUR, 3.0),
            (IDX_AFTER_HOURS, 1.0),
            (IDX_SEVERITY, 4.0),
            (IDX_KEYWORD_RISK, 0.95),
        ]);

        let result = explain(&record, features.view(), fused(0.92), &SeverityBands::default());
        assert_eq!(result.severity, Some(SeverityTier::Critical));
        assert!(result.explanation.starts_with("Anomaly (score: 0.920, CRITICAL) - unusual activity time (03:00)"));
        assert!(result.explanation.contains("Top detectors: tree partition 0.350, keyword rules 0.190"));
        assert_eq!(result.top_detector(), Some(DetectorKind::TreePartition));
        assert_eq!(result.matched_terms[0], "failed password");
        assert!(result.matched_terms.contains(&"root".to_string()));
    }

    #[test]
    fn test_unflagged_explanation() {
        let record = LogRecord::new("r2", "2024-05-06T10:00:00Z", "cron", "job done");
        let result = explain(&record, row(&[]).view(), fused(0.1), &SeverityBands::default());
        assert_eq!(result.severity, None);
        assert_eq!(result.explanation, "No anomaly (score: 0.100)");
        assert!(result.reasons.is_empty());
        assert!(result.matched_terms.is_empty());
    }

    #[test]
    fn test_threat_multipliers_stack_and_cap() {
        let record = LogRecord::new("r3", "", "sshd", "").with_severity("critical");
        let features = row(&[(IDX_AFTER_HOURS, 1.0)]);

        let (threat, multiplier) = threat_score(&record, "unauthorized access", features.view(), 0.5);
        assert_eq!(multiplier, 1.52); // 1.2 * 1.15 * 1.1
        assert!((threat - 75.9).abs() < 0.01);

        let (capped, _) = threat_score(&record, "unauthorized access", features.view(), 0.9);
        assert_eq!(capped, 100.0);

        let plain = LogRecord::new("r4", "", "cron", "");
        assert_eq!(threat_score(&plain, "ok", row(&[]).view(), 0.4), (40.0, 1.0));
    }
}
