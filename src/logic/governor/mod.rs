//! Resource Governor Module
//!
//! Decides how a run uses the machine: numeric backend, chunking, memory
//! admission and the worker pool detectors fan out on.

pub mod backend;
pub mod chunking;
pub mod pool;
pub mod timing;

pub use backend::{ComputeBackend, KernelBackend};
pub use chunking::{AdmitDenied, ChunkPlan, MemoryBudget};
pub use pool::{Task, TaskOutcome, WorkerPool};
pub use timing::{StageTimer, StageTimings};

use crate::logic::config::EngineConfig;

pub struct ResourceGovernor {
    backend: ComputeBackend,
    budget: MemoryBudget,
    chunk_threshold: usize,
    chunk_size: usize,
}

impl ResourceGovernor {
    pub fn new(config: &EngineConfig) -> Self {
        let backend = ComputeBackend::select(config.allow_acceleration);
        let budget = MemoryBudget::resolve(config.memory_budget_bytes, config.memory_budget_fraction);
        Self {
            backend,
            budget,
            chunk_threshold: config.large_dataset_chunk_threshold,
            chunk_size: config.large_dataset_chunk_size,
        }
    }

    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    pub fn plan(&self, total: usize) -> ChunkPlan {
        let plan = ChunkPlan::new(total, self.chunk_threshold, self.chunk_size);
        if plan.chunked {
            log::info!(
                "Large dataset detected ({} records > {}). Processing in {} chunks of {}",
                total,
                self.chunk_threshold,
                plan.chunk_count(),
                plan.chunk_size
            );
        }
        plan
    }

    pub fn admit(&self, rows: usize, avg_message_bytes: usize, detectors: usize) -> Result<(), AdmitDenied> {
        self.budget.admit(rows, avg_message_bytes, detectors)
    }
}
