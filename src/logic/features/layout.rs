//! Feature Layout - Centralized Feature Definition
//!
//! **CRITICAL: This file controls the feature schema**
//!
//! ## Rules (NEVER break these):
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION
//!
//! Persisted detector artifacts carry the layout hash; a mismatch makes them stale.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
/// MUST be incremented when layout changes
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Feature names in exact order they appear in a matrix row
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Temporal (0-2) ===
    "hour_of_day",            // 0: Hour 0-23 (12 when timestamp unusable)
    "day_of_week",            // 1: 0 = Monday
    "after_hours",            // 2: 1 if hour < 6 or > 22

    // === Frequency / Rarity (3-6) ===
    "source_rarity",          // 3: 1 - batch share of this source
    "event_id_rarity",        // 4: 1 - batch share of this event id
    "account_rarity",         // 5: 1 - batch share of this account (0 if none)
    "template_rarity",        // 6: 1 - batch share of the digit-masked message

    // === Lexical (7-13) ===
    "message_length",         // 7: ln(1 + chars)
    "word_count",             // 8: Capped at 50
    "keyword_risk",           // 9: Max risk of matched keywords
    "has_failure_signal",     // 10
    "has_privilege_signal",   // 11
    "has_auth_signal",        // 12
    "severity_level",         // 13: 0 (DEBUG) .. 5 (CRITICAL)

    // === Structural (14-19) ===
    "source_risk",            // 14: Prior risk of the source
    "has_account",            // 15
    "ip_mentions",            // 16: IPv4 addresses in message, capped at 5
    "has_port",               // 17
    "digit_ratio",            // 18: Digits / chars
    "structured_field_count", // 19: Optional fields present
];

/// Total number of features
/// IMPORTANT: Must match FEATURE_LAYOUT.len()!
pub const FEATURE_COUNT: usize = 20;

// Named indices used by the extractor and explainer
pub const IDX_HOUR: usize = 0;
pub const IDX_WEEKDAY: usize = 1;
pub const IDX_AFTER_HOURS: usize = 2;
pub const IDX_SOURCE_RARITY: usize = 3;
pub const IDX_EVENT_RARITY: usize = 4;
pub const IDX_ACCOUNT_RARITY: usize = 5;
pub const IDX_TEMPLATE_RARITY: usize = 6;
pub const IDX_MESSAGE_LENGTH: usize = 7;
pub const IDX_WORD_COUNT: usize = 8;
pub const IDX_KEYWORD_RISK: usize = 9;
pub const IDX_FAILURE: usize = 10;
pub const IDX_PRIVILEGE: usize = 11;
pub const IDX_AUTH: usize = 12;
pub const IDX_SEVERITY: usize = 13;
pub const IDX_SOURCE_RISK: usize = 14;
pub const IDX_HAS_ACCOUNT: usize = 15;
pub const IDX_IP_MENTIONS: usize = 16;
pub const IDX_HAS_PORT: usize = 17;
pub const IDX_DIGIT_RATIO: usize = 18;
pub const IDX_FIELD_COUNT: usize = 19;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// Compute CRC32 hash of the feature layout
/// Used to detect layout mismatches at runtime
pub fn compute_layout_hash() -> u32 {
    let mut hasher = Hasher::new();

    hasher.update(&[FEATURE_VERSION]);

    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // Separator
    }

    hasher.finalize()
}

pub fn layout_hash() -> u32 {
    compute_layout_hash()
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Complete layout information for serialization/logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// FEATURE INDEX LOOKUP
// ============================================================================

/// Get feature index by name (O(n) but features are few)
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Get feature name by index
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count() {
        assert_eq!(FEATURE_COUNT, 20);
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_layout_hash_consistency() {
        assert_eq!(compute_layout_hash(), compute_layout_hash());
        assert_ne!(layout_hash(), 0);
    }

    #[test]
    fn test_named_indices_match_layout() {
        assert_eq!(feature_index("hour_of_day"), Some(IDX_HOUR));
        assert_eq!(feature_index("keyword_risk"), Some(IDX_KEYWORD_RISK));
        assert_eq!(feature_index("event_id_rarity"), Some(IDX_EVENT_RARITY));
        assert_eq!(feature_index("structured_field_count"), Some(IDX_FIELD_COUNT));
        assert_eq!(feature_index("nonexistent"), None);
    }

    #[test]
    fn test_feature_name() {
        assert_eq!(feature_name(0), Some("hour_of_day"));
        assert_eq!(feature_name(19), Some("structured_field_count"));
        assert_eq!(feature_name(100), None);
    }

    #[test]
    fn test_layout_info() {
        let info = LayoutInfo::current();
        assert_eq!(info.version, FEATURE_VERSION);
        assert_eq!(info.feature_names.len(), FEATURE_COUNT);
    }
}
