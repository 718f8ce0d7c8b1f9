//! Precompiled patterns and lexical tables
//!
//! Everything here is compiled once per process. Compiling per record was the
//! dominant extraction cost.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

/// Keyword -> risk used by the `keyword_risk` feature
pub const RISK_KEYWORDS: &[(&str, f64)] = &[
    ("failed password", 0.95),
    ("authentication failed", 0.95),
    ("invalid user", 0.90),
    ("sasl login", 0.88),
    ("failed mfa", 0.97),
    ("suspicious command", 0.98),
    ("unauthorized", 0.93),
    ("brute", 0.96),
    ("exploit", 0.99),
    ("rootkit", 1.0),
    ("failed", 0.65),
    ("error", 0.55),
    ("warning", 0.45),
    ("denied", 0.70),
    ("rejected", 0.68),
    ("blocked", 0.60),
    ("sudo", 0.55),
    ("root", 0.52),
    ("admin", 0.50),
    ("disconnect", 0.40),
    ("connect from unknown", 0.65),
    ("accepted publickey", 0.25),
    ("started session", 0.15),
    ("container started", 0.20),
    ("user login succeeded", 0.20),
];

/// Prior risk per source (lowercase exact match)
pub const SOURCE_RISK: &[(&str, f64)] = &[
    ("sshd", 0.50),
    ("sudo", 0.60),
    ("kernel", 0.55),
    ("auditd", 0.55),
    ("postfix", 0.45),
    ("nginx", 0.40),
    ("cron", 0.15),
    ("systemd", 0.15),
    ("dockerd", 0.20),
    ("app-worker", 0.45),
];

pub const DEFAULT_SOURCE_RISK: f64 = 0.30;

pub const FAILURE_TOKENS: &[&str] = &["failed", "failure", "denied", "rejected"];
pub const PRIVILEGE_TOKENS: &[&str] = &["sudo", "root", "admin", "privilege"];
pub const AUTH_TOKENS: &[&str] = &["ssh", "publickey", "password", "login"];

pub static IP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").expect("static IP pattern"));

pub static PORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bport\s+\d+\b").expect("static port pattern"));

static DIGIT_RUN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("static digit pattern"));

/// One automaton over every risk keyword, indices follow RISK_KEYWORDS
pub static RISK_KEYWORD_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(RISK_KEYWORDS.iter().map(|(kw, _)| regex::escape(kw)))
        .expect("static keyword set")
});

/// Highest risk among keywords found in an already-lowercased message
pub fn keyword_risk(message_lower: &str) -> f64 {
    RISK_KEYWORD_SET
        .matches(message_lower)
        .iter()
        .map(|i| RISK_KEYWORDS[i].1)
        .fold(0.0, f64::max)
}

pub fn source_risk(source_lower: &str) -> f64 {
    SOURCE_RISK
        .iter()
        .find(|(name, _)| *name == source_lower)
        .map(|(_, risk)| *risk)
        .unwrap_or(DEFAULT_SOURCE_RISK)
}

pub fn contains_any(message_lower: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| message_lower.contains(t))
}

/// Message shape with addresses and numbers masked, used for template rarity
pub fn message_template(message_lower: &str) -> String {
    let masked = IP_REGEX.replace_all(message_lower, "<ip>");
    DIGIT_RUN_REGEX.replace_all(&masked, "#").into_owned()
}

/// Severity label -> ordinal level
pub fn severity_level(severity: Option<&str>) -> f64 {
    let Some(label) = severity else { return 1.0 };
    match label.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" => 5.0,
        "HIGH" | "ERROR" => 4.0,
        "MEDIUM" | "WARN" | "WARNING" => 3.0,
        "LOW" => 2.0,
        "INFO" => 1.0,
        "DEBUG" => 0.0,
        _ => 1.0,
    }
}
