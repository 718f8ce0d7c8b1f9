//! Log Record - input handed over by the ingestion layer
//!
//! Records are already parsed into fields. The core never mutates them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record identifier assigned by the ingestion layer
    pub id: String,
    /// ISO-8601 / RFC 3339 timestamp text
    #[serde(default)]
    pub timestamp: String,
    /// Source identifier (sshd, kernel, Security, ...)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,

    // Optional structured fields
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub process_name: Option<String>,
}

impl LogRecord {
    pub fn new(id: impl Into<String>, timestamp: impl Into<String>, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: timestamp.into(),
            source: source.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_severity(mut self, severity: &str) -> Self {
        self.severity = Some(severity.to_string());
        self
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    /// Parse the timestamp; accepts RFC 3339 and naive `YYYY-MM-DD[T ]HH:MM:SS`
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    /// Count of optional structured fields carried by the record
    pub fn structured_field_count(&self) -> usize {
        [
            self.severity.is_some(),
            self.event_id.is_some(),
            self.account.is_some(),
            self.ip_address.is_some(),
            self.port.is_some(),
            self.hostname.is_some(),
            self.process_name.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_rfc3339_and_naive() {
        let a = LogRecord::new("1", "2024-03-01T23:15:00Z", "sshd", "x");
        assert_eq!(a.parsed_timestamp().unwrap().hour(), 23);

        let b = LogRecord::new("2", "2024-03-01 04:00:00", "sshd", "x");
        assert_eq!(b.parsed_timestamp().unwrap().hour(), 4);

        let c = LogRecord::new("3", "yesterday-ish", "sshd", "x");
        assert!(c.parsed_timestamp().is_none());
    }

    #[test]
    fn test_structured_field_count() {
        let r = LogRecord::new("1", "", "sshd", "x")
            .with_event_id("4625")
            .with_account("root");
        assert_eq!(r.structured_field_count(), 2);
    }
}
