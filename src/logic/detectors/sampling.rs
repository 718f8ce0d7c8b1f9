//! Training sample selection
//!
//! Bounded, seeded, without replacement. When row labels are available the
//! sample keeps each label's share of the input (largest-remainder rounding),
//! topped up from the remaining rows if a small class runs short.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

const UNLABELED: &str = "<none>";

#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    /// Selected row indices, ascending
    pub indices: Vec<usize>,
    pub total: usize,
    pub sampled: bool,
}

impl SampleOutcome {
    pub fn used(&self) -> usize {
        self.indices.len()
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used() as f64 / self.total as f64
        }
    }
}

/// Pick exactly `min(max_samples, total)` rows
pub fn sample_training_rows(
    total: usize,
    max_samples: usize,
    seed: u64,
    labels: Option<&[Option<String>]>,
) -> SampleOutcome {
    if total <= max_samples {
        return SampleOutcome {
            indices: (0..total).collect(),
            total,
            sampled: false,
        };
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let labels = labels.filter(|l| l.len() == total && l.iter().any(|v| v.is_some()));

    let mut indices = match labels {
        None => index::sample(&mut rng, total, max_samples).into_vec(),
        Some(labels) => stratified(&mut rng, labels, max_samples),
    };
    indices.sort_unstable();

    SampleOutcome {
        indices,
        total,
        sampled: true,
    }
}

fn stratified(rng: &mut StdRng, labels: &[Option<String>], max_samples: usize) -> Vec<usize> {
    let total = labels.len();

    let mut classes: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        classes.entry(label.as_deref().unwrap_or(UNLABELED)).or_default().push(row);
    }

    // floor(share * max) per class, leftovers to the largest remainders
    let mut targets: Vec<(usize, f64)> = classes
        .values()
        .map(|rows| {
            let exact = rows.len() as f64 / total as f64 * max_samples as f64;
            (exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = targets.iter().map(|(t, _)| t).sum();
    let mut order: Vec<usize> = (0..targets.len()).collect();
    order.sort_by(|a, b| targets[*b].1.total_cmp(&targets[*a].1));
    for &class in order.iter().take(max_samples.saturating_sub(assigned)) {
        targets[class].0 += 1;
    }

    let mut selected = Vec::with_capacity(max_samples);
    for (rows, (target, _)) in classes.values().zip(targets.iter()) {
        let take = rows.len().min(*target);
        if take == 0 {
            continue;
        }
        selected.extend(index::sample(rng, rows.len(), take).into_iter().map(|i| rows[i]));
    }

    if selected.len() < max_samples {
        let taken: HashSet<usize> = selected.iter().copied().collect();
        let pool: Vec<usize> = (0..total).filter(|i| !taken.contains(i)).collect();
        let missing = (max_samples - selected.len()).min(pool.len());
        selected.extend(index::sample(rng, pool.len(), missing).into_iter().map(|i| pool[i]));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(counts: &[(&str, usize)]) -> Vec<Option<String>> {
        counts
            .iter()
            .flat_map(|(label, n)| std::iter::repeat(Some(label.to_string())).take(*n))
            .collect()
    }

    #[test]
    fn test_small_input_is_untouched() {
        let outcome = sample_training_rows(5, 10, 42, None);
        assert!(!outcome.sampled);
        assert_eq!(outcome.indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.fraction(), 1.0);
    }

    #[test]
    fn test_exact_cap_without_labels() {
        let outcome = sample_training_rows(1000, 100, 42, None);
        assert!(outcome.sampled);
        assert_eq!(outcome.used(), 100);
        let unique: HashSet<_> = outcome.indices.iter().collect();
        assert_eq!(unique.len(), 100);
    }

    #[test]
    fn test_stratified_preserves_shares() {
        let l = labels(&[("INFO", 900), ("HIGH", 90), ("CRITICAL", 10)]);
        let outcome = sample_training_rows(l.len(), 100, 7, Some(&l));
        assert_eq!(outcome.used(), 100);

        let count = |name: &str| {
            outcome
                .indices
                .iter()
                .filter(|i| l[**i].as_deref() == Some(name))
                .count()
        };
        assert_eq!(count("INFO"), 90);
        assert_eq!(count("HIGH"), 9);
        assert_eq!(count("CRITICAL"), 1);
    }

    #[test]
    fn test_largest_remainder_fills_to_cap() {
        let l = labels(&[("A", 1), ("B", 1), ("C", 1)]);
        let outcome = sample_training_rows(3, 2, 1, Some(&l));
        assert_eq!(outcome.used(), 2);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let l = labels(&[("INFO", 500), ("HIGH", 500)]);
        let a = sample_training_rows(1000, 50, 99, Some(&l));
        let b = sample_training_rows(1000, 50, 99, Some(&l));
        let c = sample_training_rows(1000, 50, 100, Some(&l));
        assert_eq!(a, b);
        assert_ne!(a.indices, c.indices);
    }
}
