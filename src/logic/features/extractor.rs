//! Feature Extractor - LogRecord batch -> FeatureMatrix
//!
//! Column-at-a-time transforms over the whole batch. A malformed record never
//! fails the batch: its unusable fields take defaults and it is counted as skipped.

use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::{Array1, Array2};

use crate::logic::records::LogRecord;
use super::layout::*;
use super::matrix::FeatureMatrix;
use super::patterns::{self, AUTH_TOKENS, FAILURE_TOKENS, PRIVILEGE_TOKENS};
use super::profile::FrequencyProfile;

const DEFAULT_HOUR: f64 = 12.0;
const MAX_WORDS: f64 = 50.0;
const MAX_IP_MENTIONS: f64 = 5.0;

// ============================================================================
// ERRORS
// ============================================================================

/// Why a record was counted as skipped. Always recovered locally.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureExtractionError {
    InvalidTimestamp { row: usize, raw: String },
    EmptyRecord { row: usize },
    NonFinite { row: usize, feature: &'static str },
}

impl std::fmt::Display for FeatureExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureExtractionError::InvalidTimestamp { row, raw } => {
                write!(f, "row {}: unparsable timestamp '{}'", row, raw)
            }
            FeatureExtractionError::EmptyRecord { row } => {
                write!(f, "row {}: record has neither source nor message", row)
            }
            FeatureExtractionError::NonFinite { row, feature } => {
                write!(f, "row {}: non-finite value for {}", row, feature)
            }
        }
    }
}

impl std::error::Error for FeatureExtractionError {}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExtractedBatch {
    pub matrix: FeatureMatrix,
    /// Records that needed default substitution
    pub skipped: usize,
    pub errors: Vec<FeatureExtractionError>,
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Stateless; rarity comes from the profile passed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Width of every row this extractor produces
    pub fn width(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn extract_batch(&self, records: &[LogRecord], profile: &FrequencyProfile) -> ExtractedBatch {
        let n = records.len();
        log::debug!("Extracting features from {} logs", n);

        let mut errors = Vec::new();

        // Shared per-record inputs, computed once
        let timestamps: Vec<Option<DateTime<Utc>>> = records.iter().map(|r| r.parsed_timestamp()).collect();
        let messages: Vec<String> = records.iter().map(|r| r.message.to_lowercase()).collect();
        let sources: Vec<String> = records.iter().map(|r| r.source.trim().to_lowercase()).collect();

        for (row, (record, ts)) in records.iter().zip(timestamps.iter()).enumerate() {
            if record.source.trim().is_empty() && record.message.trim().is_empty() {
                errors.push(FeatureExtractionError::EmptyRecord { row });
            } else if ts.is_none() {
                errors.push(FeatureExtractionError::InvalidTimestamp {
                    row,
                    raw: record.timestamp.clone(),
                });
            }
        }

        // === Temporal ===
        let hours: Array1<f64> = timestamps
            .iter()
            .map(|ts| ts.map(|t| t.hour() as f64).unwrap_or(DEFAULT_HOUR))
            .collect();
        let weekdays: Array1<f64> = timestamps
            .iter()
            .map(|ts| ts.map(|t| t.weekday().num_days_from_monday() as f64).unwrap_or(0.0))
            .collect();
        let after_hours = hours.mapv(|h| if h < 6.0 || h > 22.0 { 1.0 } else { 0.0 });

        // === Rarity ===
        let source_rarity: Array1<f64> = records.iter().map(|r| profile.source_rarity(&r.source)).collect();
        let event_rarity: Array1<f64> = records
            .iter()
            .map(|r| profile.event_id_rarity(r.event_id.as_deref()))
            .collect();
        let account_rarity: Array1<f64> = records
            .iter()
            .map(|r| profile.account_rarity(r.account.as_deref()))
            .collect();
        let template_rarity: Array1<f64> = messages
            .iter()
            .map(|m| profile.template_rarity(&patterns::message_template(m)))
            .collect();

        // === Lexical ===
        let char_counts: Array1<f64> = records.iter().map(|r| r.message.chars().count() as f64).collect();
        let message_length = char_counts.mapv(f64::ln_1p);
        let word_count: Array1<f64> = messages
            .iter()
            .map(|m| (m.split_whitespace().count() as f64).min(MAX_WORDS))
            .collect();
        let keyword_risk: Array1<f64> = messages.iter().map(|m| patterns::keyword_risk(m)).collect();
        let has_failure = token_flags(&messages, FAILURE_TOKENS);
        let has_privilege = token_flags(&messages, PRIVILEGE_TOKENS);
        let has_auth = token_flags(&messages, AUTH_TOKENS);
        let severity: Array1<f64> = records
            .iter()
            .map(|r| patterns::severity_level(r.severity.as_deref()))
            .collect();

        // === Structural ===
        let source_risk: Array1<f64> = sources.iter().map(|s| patterns::source_risk(s)).collect();
        let has_account: Array1<f64> = records
            .iter()
            .map(|r| flag(r.account.as_deref().map_or(false, |a| !a.trim().is_empty())))
            .collect();
        let ip_mentions: Array1<f64> = records
            .iter()
            .map(|r| (patterns::IP_REGEX.find_iter(&r.message).count() as f64).min(MAX_IP_MENTIONS))
            .collect();
        let has_port: Array1<f64> = messages
            .iter()
            .zip(records.iter())
            .map(|(m, r)| flag(r.port.is_some() || patterns::PORT_REGEX.is_match(m)))
            .collect();
        let digits: Array1<f64> = records
            .iter()
            .map(|r| r.message.chars().filter(|c| c.is_ascii_digit()).count() as f64)
            .collect();
        let digit_ratio = ndarray::Zip::from(&digits)
            .and(&char_counts)
            .map_collect(|d, c| if *c > 0.0 { d / c } else { 0.0 });
        let field_count: Array1<f64> = records.iter().map(|r| r.structured_field_count() as f64).collect();

        let columns: [(usize, Array1<f64>); FEATURE_COUNT] = [
            (IDX_HOUR, hours),
            (IDX_WEEKDAY, weekdays),
            (IDX_AFTER_HOURS, after_hours),
            (IDX_SOURCE_RARITY, source_rarity),
            (IDX_EVENT_RARITY, event_rarity),
            (IDX_ACCOUNT_RARITY, account_rarity),
            (IDX_TEMPLATE_RARITY, template_rarity),
            (IDX_MESSAGE_LENGTH, message_length),
            (IDX_WORD_COUNT, word_count),
            (IDX_KEYWORD_RISK, keyword_risk),
            (IDX_FAILURE, has_failure),
            (IDX_PRIVILEGE, has_privilege),
            (IDX_AUTH, has_auth),
            (IDX_SEVERITY, severity),
            (IDX_SOURCE_RISK, source_risk),
            (IDX_HAS_ACCOUNT, has_account),
            (IDX_IP_MENTIONS, ip_mentions),
            (IDX_HAS_PORT, has_port),
            (IDX_DIGIT_RATIO, digit_ratio),
            (IDX_FIELD_COUNT, field_count),
        ];

        let mut values = Array2::<f64>::zeros((n, FEATURE_COUNT));
        for (idx, column) in columns {
            values.column_mut(idx).assign(&column);
        }

        // Scrub anything non-finite; only counted if the row was otherwise fine
        for ((row, col), value) in values.indexed_iter_mut() {
            if !value.is_finite() {
                *value = 0.0;
                if !errors.iter().any(|e| error_row(e) == row) {
                    errors.push(FeatureExtractionError::NonFinite {
                        row,
                        feature: FEATURE_LAYOUT[col],
                    });
                }
            }
        }

        let skipped = errors.len();
        if skipped > 0 {
            log::warn!("Feature extraction: {} of {} records used defaults", skipped, n);
            for e in errors.iter().take(5) {
                log::debug!("  {}", e);
            }
        }

        ExtractedBatch {
            matrix: FeatureMatrix::new(values),
            skipped,
            errors,
        }
    }
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn token_flags(messages: &[String], tokens: &[&str]) -> Array1<f64> {
    messages.iter().map(|m| flag(patterns::contains_any(m, tokens))).collect()
}

fn error_row(error: &FeatureExtractionError) -> usize {
    match error {
        FeatureExtractionError::InvalidTimestamp { row, .. }
        | FeatureExtractionError::EmptyRecord { row }
        | FeatureExtractionError::NonFinite { row, .. } => *row,
    }
}
