//! Frequency Profile - batch-wide value counts for rarity features
//!
//! Built once over the whole input batch before any chunking, so every chunk
//! sees the same rarity values an unchunked run would.

use std::collections::HashMap;

use crate::logic::records::LogRecord;
use super::patterns::message_template;

#[derive(Debug, Clone, Default)]
pub struct FrequencyProfile {
    total: usize,
    sources: HashMap<String, usize>,
    event_ids: HashMap<String, usize>,
    accounts: HashMap<String, usize>,
    templates: HashMap<String, usize>,
}

impl FrequencyProfile {
    pub fn from_records(records: &[LogRecord]) -> Self {
        let mut profile = Self {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            *profile.sources.entry(normalize(&record.source)).or_insert(0) += 1;
            if let Some(event_id) = non_empty(record.event_id.as_deref()) {
                *profile.event_ids.entry(event_id).or_insert(0) += 1;
            }
            if let Some(account) = non_empty(record.account.as_deref()) {
                *profile.accounts.entry(account).or_insert(0) += 1;
            }
            let template = message_template(&record.message.to_lowercase());
            *profile.templates.entry(template).or_insert(0) += 1;
        }

        profile
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn source_rarity(&self, source: &str) -> f64 {
        self.rarity(&self.sources, &normalize(source))
    }

    /// Records without an event id get 0 (nothing rare about absence)
    pub fn event_id_rarity(&self, event_id: Option<&str>) -> f64 {
        match non_empty(event_id) {
            Some(id) => self.rarity(&self.event_ids, &id),
            None => 0.0,
        }
    }

    pub fn account_rarity(&self, account: Option<&str>) -> f64 {
        match non_empty(account) {
            Some(acc) => self.rarity(&self.accounts, &acc),
            None => 0.0,
        }
    }

    pub fn template_rarity(&self, template: &str) -> f64 {
        self.rarity(&self.templates, template)
    }

    fn rarity(&self, table: &HashMap<String, usize>, key: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        // Values not seen while profiling are as rare as it gets
        let count = table.get(key).copied().unwrap_or(0);
        1.0 - (count as f64 / self.total as f64)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(normalize).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_is_one_minus_share() {
        let mut records: Vec<LogRecord> = (0..8)
            .map(|i| LogRecord::new(i.to_string(), "", "cron", "job ran").with_event_id("100"))
            .collect();
        records.push(LogRecord::new("8", "", "sshd", "odd").with_event_id("4625"));
        records.push(LogRecord::new("9", "", "sshd", "odd").with_event_id("4625"));

        let profile = FrequencyProfile::from_records(&records);
        assert!((profile.event_id_rarity(Some("100")) - 0.2).abs() < 1e-12);
        assert!((profile.event_id_rarity(Some("4625")) - 0.8).abs() < 1e-12);
        assert_eq!(profile.event_id_rarity(None), 0.0);
        assert!((profile.source_rarity("SSHD") - 0.8).abs() < 1e-12);
        assert_eq!(profile.source_rarity("never-seen"), 1.0);
    }

    #[test]
    fn test_empty_profile() {
        let profile = FrequencyProfile::from_records(&[]);
        assert_eq!(profile.total(), 0);
        assert_eq!(profile.source_rarity("x"), 0.0);
    }
}
