//! Compute Backend - accelerated numeric path selection
//!
//! Detected once at engine start in a fixed priority order. No acceleration is a
//! configuration fact, never a failure: the scalar path always works.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeBackend {
    Avx2,
    Sse41,
    Neon,
    Scalar,
}

impl ComputeBackend {
    /// Detection order: AVX2 -> SSE4.1 -> NEON -> scalar
    pub fn select(allow_acceleration: bool) -> Self {
        if !allow_acceleration {
            log::info!("Compute backend: scalar (acceleration disabled by config)");
            return ComputeBackend::Scalar;
        }

        let detected = Self::detect();
        if detected.is_accelerated() {
            log::info!("Compute backend: {} detected", detected.as_str());
        } else {
            log::info!("Compute backend: no accelerated path detected - using scalar CPU path");
        }
        detected
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn detect() -> Self {
        if std::is_x86_feature_detected!("avx2") {
            ComputeBackend::Avx2
        } else if std::is_x86_feature_detected!("sse4.1") {
            ComputeBackend::Sse41
        } else {
            ComputeBackend::Scalar
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn detect() -> Self {
        if std::arch::is_aarch64_feature_detected!("neon") {
            ComputeBackend::Neon
        } else {
            ComputeBackend::Scalar
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    fn detect() -> Self {
        ComputeBackend::Scalar
    }

    pub fn is_accelerated(&self) -> bool {
        !matches!(self, ComputeBackend::Scalar)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeBackend::Avx2 => "avx2",
            ComputeBackend::Sse41 => "sse4.1",
            ComputeBackend::Neon => "neon",
            ComputeBackend::Scalar => "scalar",
        }
    }

    /// Kernel implementation for this backend
    pub fn kernel(&self) -> &'static dyn KernelBackend {
        if self.is_accelerated() {
            &LANE_KERNEL
        } else {
            &SCALAR_KERNEL
        }
    }
}

impl std::fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// KERNEL BACKENDS
// ============================================================================

/// Numeric primitives a detector may run on an accelerated path
pub trait KernelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Squared euclidean distance; slices have equal length
    fn squared_distance(&self, a: &[f64], b: &[f64]) -> f64;
}

/// Plain one-accumulator loop
pub struct ScalarKernel;

/// Four independent accumulators so the compiler can keep lanes in SIMD registers
pub struct LaneKernel;

static SCALAR_KERNEL: ScalarKernel = ScalarKernel;
static LANE_KERNEL: LaneKernel = LaneKernel;

impl KernelBackend for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn squared_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }
}

impl KernelBackend for LaneKernel {
    fn name(&self) -> &'static str {
        "lanes"
    }

    fn squared_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let len = a.len().min(b.len());
        let (a, b) = (&a[..len], &b[..len]);

        let mut acc = [0.0f64; 4];
        let mut a_chunks = a.chunks_exact(4);
        let mut b_chunks = b.chunks_exact(4);
        for (ca, cb) in (&mut a_chunks).zip(&mut b_chunks) {
            for lane in 0..4 {
                let d = ca[lane] - cb[lane];
                acc[lane] += d * d;
            }
        }

        let tail: f64 = a_chunks
            .remainder()
            .iter()
            .zip(b_chunks.remainder())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();

        (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
    }
}
