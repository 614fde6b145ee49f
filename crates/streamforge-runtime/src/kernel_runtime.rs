//! The embedding point between this crate's drivers and whatever actually
//! executes a kernel's body for one segment. `streamforge-compiler` only
//! emits the control-flow shape of `doSegment`'s call site (see
//! `streamforge_compiler::segment`); something downstream — codegen'd
//! native code, or an interpreter for tests — has to actually run it.

use streamforge_model::{KernelId, TerminationSignal};

/// What running one kernel for one segment produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub signal: TerminationSignal,
    /// Whether this call consumed or produced at least one item. Feeds
    /// the driver's deadlock watch.
    pub made_progress: bool,
}

impl SegmentOutcome {
    pub fn progress() -> Self {
        Self { signal: TerminationSignal::None, made_progress: true }
    }

    pub fn stalled() -> Self {
        Self { signal: TerminationSignal::None, made_progress: false }
    }

    pub fn terminated(signal: TerminationSignal) -> Self {
        Self { signal, made_progress: false }
    }
}

/// Runs one kernel's `doSegment` for a given logical segment number.
/// Implementations must be safe to call concurrently for distinct
/// kernels, and must serialize calls to the same kernel themselves if
/// they hold shared state (the driver already serializes via the LSN
/// lock for non-internally-synchronized kernels).
pub trait KernelRuntime: Send + Sync {
    fn run_segment(&self, kernel: KernelId, segment: u64) -> SegmentOutcome;

    fn internally_synchronized(&self, kernel: KernelId) -> bool {
        let _ = kernel;
        false
    }
}
