//! Chunk planning and memory admission
//!
//! Batches above the configured threshold are cut into fixed-size ranges that
//! are processed strictly one after another. Each range is admitted against a
//! memory budget before its features are materialized.

use std::ops::Range;

use sysinfo::System;

use crate::logic::features::FEATURE_COUNT;

/// Fixed per-row cost besides the message text: feature row, detector scores,
/// result struct with contributions.
const ROW_OVERHEAD_BYTES: u64 = (FEATURE_COUNT as u64) * 8 + 4 * 96 + 512;

// ============================================================================
// CHUNK PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total: usize,
    pub chunk_size: usize,
    pub chunked: bool,
}

impl ChunkPlan {
    /// Split only when `total` strictly exceeds `threshold`
    pub fn new(total: usize, threshold: usize, chunk_size: usize) -> Self {
        let chunked = total > threshold;
        let chunk_size = if chunked { chunk_size.max(1) } else { total.max(1) };
        Self {
            total,
            chunk_size,
            chunked,
        }
    }

    pub fn chunk_count(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            (self.total + self.chunk_size - 1) / self.chunk_size
        }
    }

    pub fn ranges(&self) -> Vec<Range<usize>> {
        self.ranges_from(0)
    }

    /// Consecutive ranges covering `start..total`
    pub fn ranges_from(&self, start: usize) -> Vec<Range<usize>> {
        let size = self.chunk_size.max(1);
        (start..self.total)
            .step_by(size)
            .map(|begin| begin..(begin + size).min(self.total))
            .collect()
    }

    /// Same batch, cut into smaller pieces
    pub fn resized(&self, chunk_size: usize) -> Self {
        Self {
            total: self.total,
            chunk_size: chunk_size.max(1),
            chunked: true,
        }
    }
}

// ============================================================================
// MEMORY BUDGET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBudget {
    pub limit_bytes: u64,
}

/// Rejected admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitDenied {
    pub needed_bytes: u64,
    pub budget_bytes: u64,
}

impl MemoryBudget {
    /// Explicit limit wins; otherwise a fraction of currently available memory
    pub fn resolve(explicit: Option<u64>, fraction: f64) -> Self {
        if let Some(limit_bytes) = explicit {
            return Self { limit_bytes };
        }

        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();
        let limit_bytes = if available == 0 {
            // Platform gave nothing usable: do not block work on a bogus reading
            u64::MAX
        } else {
            (available as f64 * fraction) as u64
        };

        log::info!(
            "Memory budget: {} MB ({:.0}% of {} MB available)",
            limit_bytes / 1024 / 1024,
            fraction * 100.0,
            available / 1024 / 1024
        );
        Self { limit_bytes }
    }

    /// Rough working-set estimate for one chunk
    pub fn estimate(rows: usize, avg_message_bytes: usize, detectors: usize) -> u64 {
        let per_row = ROW_OVERHEAD_BYTES + (avg_message_bytes as u64) * 3 + (detectors as u64) * 64;
        per_row.saturating_mul(rows as u64)
    }

    /// Most rows whose estimate still fits the limit
    pub fn max_rows(&self, avg_message_bytes: usize, detectors: usize) -> usize {
        let per_row = Self::estimate(1, avg_message_bytes, detectors).max(1);
        usize::try_from(self.limit_bytes / per_row).unwrap_or(usize::MAX)
    }

    pub fn admit(&self, rows: usize, avg_message_bytes: usize, detectors: usize) -> Result<(), AdmitDenied> {
        let needed_bytes = Self::estimate(rows, avg_message_bytes, detectors);
        if needed_bytes <= self.limit_bytes {
            Ok(())
        } else {
            Err(AdmitDenied {
                needed_bytes,
                budget_bytes: self.limit_bytes,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_threshold_is_single_chunk() {
        let plan = ChunkPlan::new(100, 100, 30);
        assert!(!plan.chunked);
        assert_eq!(plan.ranges(), vec![0..100]);
    }

    #[test]
    fn test_above_threshold_splits() {
        let plan = ChunkPlan::new(101, 100, 30);
        assert!(plan.chunked);
        assert_eq!(plan.chunk_count(), 4);
        assert_eq!(plan.ranges(), vec![0..30, 30..60, 60..90, 90..101]);
    }

    #[test]
    fn test_resized_ranges_resume_mid_batch() {
        let plan = ChunkPlan::new(50, 10, 20).resized(8);
        assert_eq!(plan.ranges_from(20), vec![20..28, 28..36, 36..44, 44..50]);
        assert!(plan.ranges_from(50).is_empty());
    }

    #[test]
    fn test_empty_plan() {
        let plan = ChunkPlan::new(0, 100, 30);
        assert_eq!(plan.chunk_count(), 0);
        assert!(plan.ranges().is_empty());
    }

    #[test]
    fn test_admit_against_explicit_budget() {
        let budget = MemoryBudget::resolve(Some(MemoryBudget::estimate(100, 50, 4)), 0.5);
        assert!(budget.admit(100, 50, 4).is_ok());
        let denied = budget.admit(101, 50, 4).unwrap_err();
        assert!(denied.needed_bytes > denied.budget_bytes);
        assert_eq!(budget.max_rows(50, 4), 100);
        assert_eq!(MemoryBudget { limit_bytes: 1 }.max_rows(50, 4), 0);
    }

    #[test]
    fn test_available_memory_budget_is_positive() {
        let budget = MemoryBudget::resolve(None, 0.5);
        assert!(budget.limit_bytes > 0);
    }
}
