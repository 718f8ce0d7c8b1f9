//! Run-scoped types: options the caller passes in, the report handed back

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logic::detectors::TrainingSession;
use crate::logic::explain::AnomalyResult;
use crate::logic::governor::{ComputeBackend, StageTimings};

/// Cooperative cancellation, checked between chunks
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receives results as soon as each chunk is done
pub trait ResultSink {
    fn on_chunk(&mut self, results: &[AnomalyResult]);
}

impl<F: FnMut(&[AnomalyResult])> ResultSink for F {
    fn on_chunk(&mut self, results: &[AnomalyResult]) {
        self(results)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    pub processed: usize,
    pub total: usize,
    pub chunk_index: usize,
}

#[derive(Default)]
pub struct RunOptions<'a> {
    pub sink: Option<&'a mut dyn ResultSink>,
    pub progress: Option<&'a mut dyn FnMut(RunProgress)>,
    pub abort: Option<AbortSignal>,
}

impl<'a> RunOptions<'a> {
    pub fn with_sink(mut self, sink: &'a mut dyn ResultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: &'a mut dyn FnMut(RunProgress)) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    /// One per input record, input order
    pub results: Vec<AnomalyResult>,
    /// Records scored with default substitutions
    pub skipped_records: usize,
    pub chunk_count: usize,
    /// Training runs performed by this run
    pub sessions: Vec<TrainingSession>,
    /// Detector name -> share of the batch its training actually used
    pub sampled_fractions: BTreeMap<String, f64>,
    pub timings: StageTimings,
    pub backend: ComputeBackend,
    /// Detector name -> weight used for the final chunk
    pub effective_weights: BTreeMap<String, f64>,
    /// Detector name -> why it sat out this run
    pub unavailable: BTreeMap<String, String>,
}

impl RunReport {
    pub fn flagged(&self) -> impl Iterator<Item = &AnomalyResult> {
        self.results.iter().filter(|r| r.is_flagged())
    }
}
