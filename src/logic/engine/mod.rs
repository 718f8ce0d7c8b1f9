//! Engine Module - Batch anomaly scoring pipeline
//!
//! records -> features -> {detectors, concurrently} -> fusion -> explanation
//!
//! The engine owns the model store, the worker pool and one slot per active
//! detector. Artifacts are loaded at construction, trained on first use when
//! missing or stale, saved right after training and flushed again on shutdown.

pub mod error;
pub mod run;


use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use crate::logic::config::EngineConfig;
use crate::logic::detectors::sampling::sample_training_rows;
use crate::logic::detectors::{
    build_detector, severity_label, Detector, DetectorError, DetectorInput, DetectorKind, DetectorResult,
    TrainingSession,
};
use crate::logic::ensemble::{fuse, EnsembleWeights, SeverityBands, SeverityTier};
use crate::logic::explain::{explain, AnomalyResult};
use crate::logic::features::layout::LayoutInfo;
use crate::logic::features::{FeatureExtractor, FrequencyProfile};
use crate::logic::governor::{
    ChunkPlan, ComputeBackend, ResourceGovernor, StageTimer, StageTimings, Task, TaskOutcome, WorkerPool,
};
use crate::logic::model::{LoadOutcome, ModelStore};
use crate::logic::records::LogRecord;

pub use error::EngineError;
pub use run::{AbortSignal, ResultSink, RunOptions, RunProgress, RunReport};

// ============================================================================
// DETECTOR SLOTS
// ============================================================================

enum Slot {
    /// Fitted and shareable across workers
    Ready { detector: Arc<dyn Detector>, dirty: bool },
    /// Needs `fit` before first use
    Pending(Box<dyn Detector>),
    /// Training failed; retried on the next run
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorStatus {
    Ready,
    Pending,
    Unavailable(String),
}

type FitOutput = (Box<dyn Detector>, Result<TrainingSession, DetectorError>);
type ScoreOutput = (f64, Result<Vec<DetectorResult>, DetectorError>);

// ============================================================================
// ENGINE
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    extractor: FeatureExtractor,
    governor: ResourceGovernor,
    pool: WorkerPool,
    store: Option<ModelStore>,
    slots: BTreeMap<DetectorKind, Slot>,
    weights: EnsembleWeights,
    bands: SeverityBands,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let governor = ResourceGovernor::new(&config);
        let weights = EnsembleWeights::from_config(&config);
        let bands = SeverityBands::from_cuts(&config.severity_bands);
        let active = weights.active();
        let pool = WorkerPool::new(WorkerPool::recommended_size(active.len(), config.max_workers));
        let store = config
            .persist_models
            .then(|| ModelStore::new(config.resolved_models_dir()));

        let mut engine = Self {
            config,
            extractor: FeatureExtractor::new(),
            governor,
            pool,
            store,
            slots: BTreeMap::new(),
            weights,
            bands,
        };

        for kind in active {
            let detector = build_detector(kind, &engine.config, engine.governor.backend());
            let slot = engine.load_slot(detector);
            engine.slots.insert(kind, slot);
        }

        let layout = LayoutInfo::current();
        log::info!(
            "Feature layout v{} ({} features, hash {:08x})",
            layout.version,
            layout.feature_count,
            layout.hash
        );
        log::info!(
            "Engine ready: {} detectors, backend {}, {} workers",
            engine.slots.len(),
            engine.governor.backend(),
            engine.pool.size()
        );
        Ok(engine)
    }

    /// Restore from disk when allowed and valid, otherwise queue for training
    fn load_slot(&self, mut detector: Box<dyn Detector>) -> Slot {
        let kind = detector.kind();
        if !detector.requires_training() {
            return Slot::Ready {
                detector: Arc::from(detector),
                dirty: false,
            };
        }
        if self.config.force_retrain {
            log::info!("Force retrain requested for {}", kind);
            return Slot::Pending(detector);
        }
        let Some(store) = &self.store else {
            return Slot::Pending(detector);
        };

        match store.load_validated(&detector.expectation()) {
            LoadOutcome::Valid(artifact) => {
                if !detector.restore(&artifact) {
                    log::info!("Saved {} model could not be restored - will retrain", kind);
                    return Slot::Pending(detector);
                }
                log::info!("Loaded {} model ({} training rows)", kind, artifact.sample_size);
                Slot::Ready {
                    detector: Arc::from(detector),
                    dirty: false,
                }
            }
            LoadOutcome::Missing => {
                log::info!("No saved {} model - will train on first batch", kind);
                Slot::Pending(detector)
            }
            LoadOutcome::Stale(reason) => {
                log::info!("Saved {} model is stale ({}) - will retrain", kind, reason);
                // Never loadable again; a successful fit writes a fresh one
                if let Err(e) = store.remove(kind) {
                    log::warn!("Could not remove stale {} model: {}", kind, e);
                }
                Slot::Pending(detector)
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> ComputeBackend {
        self.governor.backend()
    }

    pub fn detector_status(&self) -> BTreeMap<DetectorKind, DetectorStatus> {
        self.slots
            .iter()
            .map(|(kind, slot)| {
                let status = match slot {
                    Slot::Ready { .. } => DetectorStatus::Ready,
                    Slot::Pending(_) => DetectorStatus::Pending,
                    Slot::Unavailable(reason) => DetectorStatus::Unavailable(reason.clone()),
                };
                (*kind, status)
            })
            .collect()
    }

    /// Swap in a custom implementation for one detector kind
    pub fn replace_detector(&mut self, detector: Box<dyn Detector>) {
        let kind = detector.kind();
        let slot = if detector.is_fitted() {
            Slot::Ready {
                detector: Arc::from(detector),
                dirty: false,
            }
        } else {
            Slot::Pending(detector)
        };
        self.slots.insert(kind, slot);
    }

    pub fn analyze(&mut self, records: &[LogRecord]) -> Result<RunReport, EngineError> {
        self.analyze_with(records, RunOptions::default())
    }

    pub fn analyze_with(&mut self, records: &[LogRecord], mut options: RunOptions<'_>) -> Result<RunReport, EngineError> {
        if records.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let run_start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let total = records.len();
        log::info!("Run {} started: {} records", run_id, total);

        let mut timings = StageTimings::default();
        let profile = FrequencyProfile::from_records(records);
        let plan = self.governor.plan(total);
        let avg_message_bytes = records.iter().map(|r| r.message.len()).sum::<usize>() / total;
        let detector_count = self.slots.len();

        // === Training (once per run, on a bounded sample) ===
        let sessions = self.train_pending(records, &profile, &plan, avg_message_bytes, &mut timings)?;

        // Detectors sitting out this run
        let mut unavailable: BTreeMap<DetectorKind, String> = self
            .slots
            .iter()
            .filter_map(|(kind, slot)| match slot {
                Slot::Unavailable(reason) => Some((*kind, reason.clone())),
                _ => None,
            })
            .collect();
        if !self.slots.values().any(|s| matches!(s, Slot::Ready { .. })) {
            return Err(EngineError::NoDetectorsAvailable {
                reasons: unavailable.into_iter().collect(),
                partial: Vec::new(),
            });
        }

        // === Chunked scoring ===
        let mut results: Vec<AnomalyResult> = Vec::with_capacity(total);
        let mut skipped = 0usize;
        let mut retried = false;
        let mut chunk_index = 0usize;
        let mut effective_weights = BTreeMap::new();
        let mut ranges: VecDeque<std::ops::Range<usize>> = plan.ranges().into();

        while let Some(range) = ranges.pop_front() {
            if options.abort.as_ref().map_or(false, |a| a.is_aborted()) {
                log::warn!("Run {} aborted after {} of {} records", run_id, results.len(), total);
                return Err(EngineError::Aborted { partial: results });
            }

            let rows = range.len();
            if let Err(denied) = self.governor.admit(rows, avg_message_bytes, detector_count) {
                if !retried && rows > 1 {
                    retried = true;
                    let smaller = plan.resized(rows / 2);
                    log::warn!(
                        "Chunk of {} records needs ~{} MB (budget {} MB), retrying with {}",
                        rows,
                        denied.needed_bytes / 1024 / 1024,
                        denied.budget_bytes / 1024 / 1024,
                        smaller.chunk_size
                    );
                    ranges = smaller.ranges_from(range.start).into();
                    continue;
                }
                return Err(EngineError::ResourceExhausted {
                    needed_bytes: denied.needed_bytes,
                    budget_bytes: denied.budget_bytes,
                    partial: results,
                });
            }

            let chunk = &records[range.clone()];
            let (chunk_results, chunk_skipped, weights) =
                match self.score_chunk(chunk, &profile, &mut unavailable, &mut timings) {
                    Ok(scored) => scored,
                    Err(EngineError::NoDetectorsAvailable { reasons, .. }) => {
                        log::error!(
                            "Run {} lost every detector after {} of {} records",
                            run_id,
                            results.len(),
                            total
                        );
                        return Err(EngineError::NoDetectorsAvailable {
                            reasons,
                            partial: results,
                        });
                    }
                    Err(e) => return Err(e),
                };

            if let Some(sink) = options.sink.as_deref_mut() {
                sink.on_chunk(&chunk_results);
            }
            results.extend(chunk_results);
            skipped += chunk_skipped;
            effective_weights = weights;
            chunk_index += 1;

            if let Some(progress) = options.progress.as_deref_mut() {
                progress(RunProgress {
                    processed: range.end,
                    total,
                    chunk_index,
                });
            }
            if range.end < total {
                log::debug!("Chunk {} done, released ({} / {} records)", chunk_index, range.end, total);
            }
        }

        timings.total = run_start.elapsed().as_secs_f64();
        timings.log_summary();
        let flagged = results.iter().filter(|r| r.is_flagged()).count();
        log::info!(
            "Run {} complete: {} records, {} flagged, {} skipped, {} chunks",
            run_id,
            total,
            flagged,
            skipped,
            chunk_index
        );

        Ok(RunReport {
            run_id,
            results,
            skipped_records: skipped,
            chunk_count: chunk_index,
            sampled_fractions: sessions
                .iter()
                .map(|session| (session.detector.as_str().to_string(), session.sampled_fraction()))
                .collect(),
            sessions,
            timings,
            backend: self.governor.backend(),
            effective_weights: effective_weights
                .into_iter()
                .map(|(k, w): (DetectorKind, f64)| (k.as_str().to_string(), w))
                .collect(),
            unavailable: unavailable
                .into_iter()
                .map(|(k, reason)| (k.as_str().to_string(), reason))
                .collect(),
        })
    }

    // ========================================================================
    // TRAINING
    // ========================================================================

    /// Fit every pending (or previously failed) detector concurrently.
    ///
    /// Detectors see at most one chunk's worth of rows (or the boundary cap,
    /// whichever is larger), drawn stratified by severity and admitted against
    /// the memory budget like any chunk. Rarity still comes from the whole batch.
    fn train_pending(
        &mut self,
        records: &[LogRecord],
        profile: &FrequencyProfile,
        plan: &ChunkPlan,
        avg_message_bytes: usize,
        timings: &mut StageTimings,
    ) -> Result<Vec<TrainingSession>, EngineError> {
        if self.slots.values().all(|slot| matches!(slot, Slot::Ready { .. })) {
            return Ok(Vec::new());
        }

        let total = records.len();
        let rows = self.training_rows(total, plan, avg_message_bytes)?;
        let labels: Option<Vec<Option<String>>> = (rows < total).then(|| records.iter().map(severity_label).collect());
        let sample = sample_training_rows(total, rows, self.config.random_seed, labels.as_deref());
        drop(labels);
        if sample.sampled {
            log::info!(
                "Training sample: {} of {} records ({:.1}%)",
                sample.used(),
                total,
                sample.fraction() * 100.0
            );
        }

        let mut pending: Vec<(DetectorKind, Box<dyn Detector>)> = Vec::new();
        for (kind, slot) in self.slots.iter_mut() {
            match slot {
                Slot::Pending(_) => {
                    if let Slot::Pending(detector) = std::mem::replace(slot, Slot::Unavailable(String::new())) {
                        pending.push((*kind, detector));
                    }
                }
                Slot::Unavailable(_) => {
                    pending.push((*kind, build_detector(*kind, &self.config, self.governor.backend())));
                }
                Slot::Ready { .. } => {}
            }
        }

        let timer = StageTimer::start("feature_extraction");
        let input = if sample.sampled {
            let subset: Vec<LogRecord> = sample.indices.iter().map(|&i| records[i].clone()).collect();
            let batch = self.extractor.extract_batch(&subset, profile);
            DetectorInput::from_records(&subset, batch.matrix).with_population(total)
        } else {
            let batch = self.extractor.extract_batch(records, profile);
            DetectorInput::from_records(records, batch.matrix)
        };
        timings.feature_extraction += timer.stop();
        let input = Arc::new(input);

        let kinds: Vec<DetectorKind> = pending.iter().map(|(k, _)| *k).collect();
        let tasks: Vec<Task<FitOutput>> = pending
            .into_iter()
            .map(|(_, mut detector)| {
                let input = Arc::clone(&input);
                let task: Task<FitOutput> = Box::new(move || {
                    let result = detector.fit(&input);
                    (detector, result)
                });
                task
            })
            .collect();

        let outcomes = self.pool.run_all(tasks, self.config.detector_timeout());
        drop(input);

        let mut sessions = Vec::new();
        for (kind, outcome) in kinds.into_iter().zip(outcomes) {
            let slot = match outcome {
                TaskOutcome::Done((detector, Ok(session))) => {
                    log::info!(
                        "Trained {}: {} / {} rows ({:.1}%), {:.3}s, backend {}",
                        kind,
                        session.sample_size,
                        session.input_size,
                        session.sampled_fraction() * 100.0,
                        session.elapsed_secs,
                        session.backend
                    );
                    timings.add_training(kind.as_str(), session.elapsed_secs);
                    sessions.push(session);
                    let dirty = !self.save_artifact(detector.as_ref());
                    Slot::Ready {
                        detector: Arc::from(detector),
                        dirty,
                    }
                }
                TaskOutcome::Done((_, Err(e))) => {
                    log::warn!("Detector {} unavailable: {}", kind, e);
                    Slot::Unavailable(e.to_string())
                }
                TaskOutcome::Panicked(msg) => {
                    log::error!("Detector {} panicked during training: {}", kind, msg);
                    Slot::Unavailable(format!("training panicked: {}", msg))
                }
                TaskOutcome::TimedOut => {
                    log::warn!("Detector {} training timed out", kind);
                    Slot::Unavailable("training timed out".to_string())
                }
            };
            self.slots.insert(kind, slot);
        }

        Ok(sessions)
    }

    /// Rows the training sample may hold: everything when the batch is one
    /// chunk, otherwise a chunk's worth (never below the boundary cap),
    /// shrunk further if the memory budget says so
    fn training_rows(&self, total: usize, plan: &ChunkPlan, avg_message_bytes: usize) -> Result<usize, EngineError> {
        let wanted = total.min(plan.chunk_size.max(self.config.boundary_detector_sample_cap));
        let detectors = self.slots.len();
        let Err(denied) = self.governor.admit(wanted, avg_message_bytes, detectors) else {
            return Ok(wanted);
        };

        let fits = self.governor.budget().max_rows(avg_message_bytes, detectors).min(wanted);
        if fits == 0 {
            return Err(EngineError::ResourceExhausted {
                needed_bytes: denied.needed_bytes,
                budget_bytes: denied.budget_bytes,
                partial: Vec::new(),
            });
        }
        log::warn!(
            "Training sample of {} records needs ~{} MB (budget {} MB), using {}",
            wanted,
            denied.needed_bytes / 1024 / 1024,
            denied.budget_bytes / 1024 / 1024,
            fits
        );
        Ok(fits)
    }

    /// True when persisted (or persistence is off)
    fn save_artifact(&self, detector: &dyn Detector) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        match detector.serialize().map_err(|e| e.to_string()).and_then(|artifact| {
            store.save(&artifact).map_err(|e| e.to_string())
        }) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Could not save {} model: {}", detector.kind(), e);
                false
            }
        }
    }

    // ========================================================================
    // SCORING
    // ========================================================================

    fn score_chunk(
        &self,
        chunk: &[LogRecord],
        profile: &FrequencyProfile,
        unavailable: &mut BTreeMap<DetectorKind, String>,
        timings: &mut StageTimings,
    ) -> Result<(Vec<AnomalyResult>, usize, BTreeMap<DetectorKind, f64>), EngineError> {
        let rows = chunk.len();

        let timer = StageTimer::start("feature_extraction");
        let batch = self.extractor.extract_batch(chunk, profile);
        let extract_secs = timer.stop();
        timings.feature_extraction += extract_secs;
        let skipped = batch.skipped;
        let input = Arc::new(DetectorInput::from_records(chunk, batch.matrix));

        let ready: Vec<(DetectorKind, Arc<dyn Detector>)> = self
            .slots
            .iter()
            .filter(|(kind, _)| !unavailable.contains_key(*kind))
            .filter_map(|(kind, slot)| match slot {
                Slot::Ready { detector, .. } => Some((*kind, Arc::clone(detector))),
                _ => None,
            })
            .collect();

        let kinds: Vec<DetectorKind> = ready.iter().map(|(k, _)| *k).collect();
        let tasks: Vec<Task<ScoreOutput>> = ready
            .into_iter()
            .map(|(_, detector)| {
                let input = Arc::clone(&input);
                let task: Task<ScoreOutput> = Box::new(move || {
                    let start = Instant::now();
                    let result = detector.score(&input);
                    (start.elapsed().as_secs_f64(), result)
                });
                task
            })
            .collect();

        let outcomes = self.pool.run_all(tasks, self.config.detector_timeout());

        let mut outputs: Vec<(DetectorKind, Vec<DetectorResult>)> = Vec::with_capacity(kinds.len());
        for (kind, outcome) in kinds.into_iter().zip(outcomes) {
            let failure = match outcome {
                TaskOutcome::Done((secs, Ok(results))) => {
                    timings.add_scoring(kind.as_str(), secs);
                    if results.len() != rows {
                        Some(format!("returned {} results for {} records", results.len(), rows))
                    } else if results.iter().any(|r| !r.normalized_score.is_finite()) {
                        Some("non-finite score".to_string())
                    } else {
                        outputs.push((kind, results));
                        None
                    }
                }
                TaskOutcome::Done((_, Err(e))) => Some(e.to_string()),
                TaskOutcome::Panicked(msg) => Some(format!("scoring panicked: {}", msg)),
                TaskOutcome::TimedOut => Some("scoring timed out".to_string()),
            };
            if let Some(reason) = failure {
                log::warn!("Detector {} failed while scoring, excluded for the rest of the run: {}", kind, reason);
                unavailable.insert(kind, reason);
            }
        }

        let available: Vec<DetectorKind> = outputs.iter().map(|(k, _)| *k).collect();
        let weights = self
            .weights
            .redistribute(&available)
            .ok_or_else(|| EngineError::NoDetectorsAvailable {
                reasons: unavailable.iter().map(|(k, r)| (*k, r.clone())).collect(),
                partial: Vec::new(),
            })?;
        if available.len() < self.slots.len() {
            log::debug!("Redistributed weights over {:?}: {:?}", available, weights);
        }

        let timer = StageTimer::start("fusion");
        let fused = fuse(&outputs, &weights, rows);
        let fusion_secs = timer.stop();
        timings.fusion += fusion_secs;
        drop(outputs);

        let timer = StageTimer::start("explanation");
        let results: Vec<AnomalyResult> = chunk
            .iter()
            .zip(fused)
            .enumerate()
            .map(|(i, (record, fused))| explain(record, input.features.row(i), fused, &self.bands))
            .collect();
        let explain_secs = timer.stop();
        timings.explanation += explain_secs;
        log::debug!(
            "Chunk of {} scored: features {:.3}s, fusion {:.3}s, explanation {:.3}s",
            rows,
            extract_secs,
            fusion_secs,
            explain_secs
        );

        if log::log_enabled!(log::Level::Debug) {
            for (i, result) in results.iter().enumerate() {
                if result.severity == Some(SeverityTier::Critical) {
                    log::debug!("Critical {}: {}", result.record_id, input.features.row_log_entry(i));
                }
            }
        }

        Ok((results, skipped, weights))
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Save any trained model whose earlier save failed
    pub fn flush_models(&mut self) -> usize {
        let mut saved = 0;
        let dirty: Vec<DetectorKind> = self
            .slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Ready { dirty: true, .. }))
            .map(|(k, _)| *k)
            .collect();

        for kind in dirty {
            let ok = match self.slots.get(&kind) {
                Some(Slot::Ready { detector, .. }) => self.save_artifact(detector.as_ref()),
                _ => false,
            };
            if ok {
                if let Some(Slot::Ready { dirty, .. }) = self.slots.get_mut(&kind) {
                    *dirty = false;
                }
                saved += 1;
            }
        }
        saved
    }

    pub fn shutdown(mut self) {
        let saved = self.flush_models();
        log::info!("Engine shutdown ({} models flushed)", saved);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.flush_models();
    }
}
