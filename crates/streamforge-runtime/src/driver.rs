//! Single-threaded, segment-parallel and pipeline-parallel drivers: the
//! three ways a compiled pipeline's committed kernel order can be turned
//! into a running loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use streamforge_model::{KernelId, TerminationGraph, TerminationSignal};
use tracing::{debug, error};

use crate::config::ThreadingMode;
use crate::error::{Result, RuntimeError};
use crate::kernel_runtime::KernelRuntime;
use crate::lsn::{KernelLsn, SegmentCounter};
use crate::termination_code::TerminationCode;

struct DeadlockWatch {
    consecutive_stalls: u32,
}

impl DeadlockWatch {
    fn new() -> Self {
        Self { consecutive_stalls: 0 }
    }

    fn observe(&mut self, progress: bool, pipeline_terminated: bool) -> bool {
        if pipeline_terminated || progress {
            self.consecutive_stalls = 0;
            return false;
        }
        self.consecutive_stalls += 1;
        self.consecutive_stalls >= 2
    }
}

/// Drives the committed kernel order to completion under one of the
/// three threading modes.
pub struct PipelineDriver {
    kernel_order: Vec<KernelId>,
    lsns: HashMap<KernelId, KernelLsn>,
    shared: Mutex<(TerminationGraph, DeadlockWatch)>,
    segment_counter: SegmentCounter,
    aborted: AtomicBool,
}

impl PipelineDriver {
    pub fn new(kernel_order: Vec<KernelId>, termination_graph: TerminationGraph) -> Self {
        let lsns = kernel_order.iter().map(|&k| (k, KernelLsn::new())).collect();
        Self {
            kernel_order,
            lsns,
            shared: Mutex::new((termination_graph, DeadlockWatch::new())),
            segment_counter: SegmentCounter::new(),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn run(&self, runtime: &dyn KernelRuntime, mode: ThreadingMode, thread_num: u32) -> Result<TerminationCode> {
        match mode {
            ThreadingMode::SingleThreaded => self.run_single_threaded(runtime),
            ThreadingMode::SegmentParallel => self.run_segment_parallel(runtime, thread_num.max(1)),
            ThreadingMode::PipelineParallel => self.run_pipeline_parallel(runtime),
        }
    }

    fn run_single_threaded(&self, runtime: &dyn KernelRuntime) -> Result<TerminationCode> {
        let mut segment = 0u64;
        loop {
            let mut progress = false;
            for &kernel in &self.kernel_order {
                if self.shared.lock().0.is_terminated(kernel) {
                    continue;
                }
                let outcome = runtime.run_segment(kernel, segment);
                if outcome.made_progress {
                    progress = true;
                }
                if outcome.signal.is_terminated() {
                    let mut guard = self.shared.lock();
                    guard.0.set_terminated(kernel, outcome.signal);
                    if outcome.signal == TerminationSignal::Fatal {
                        error!(?kernel, "fatal termination");
                        return Err(RuntimeError::FatalTermination(kernel));
                    }
                }
            }
            let mut guard = self.shared.lock();
            let done = guard.0.has_pipeline_terminated();
            if guard.1.observe(progress, done) {
                let stuck = self.first_unterminated(&guard.0);
                return Err(RuntimeError::Deadlock(stuck));
            }
            if done {
                return Ok(TerminationCode::from(guard.0.pipeline_return_code()));
            }
            drop(guard);
            segment += 1;
        }
    }

    fn run_segment_parallel(&self, runtime: &dyn KernelRuntime, thread_num: u32) -> Result<TerminationCode> {
        let error_slot: Mutex<Option<RuntimeError>> = Mutex::new(None);
        std::thread::scope(|scope| {
            for _ in 0..thread_num {
                scope.spawn(|| {
                    while !self.aborted.load(Ordering::Acquire) {
                        let segment = self.segment_counter.claim();
                        let mut progress = false;
                        let mut fatal = None;
                        for &kernel in &self.kernel_order {
                            if self.shared.lock().0.is_terminated(kernel) {
                                continue;
                            }
                            if !runtime.internally_synchronized(kernel) {
                                self.lsns[&kernel].acquire(segment);
                            }
                            let outcome = runtime.run_segment(kernel, segment);
                            if outcome.made_progress {
                                progress = true;
                            }
                            if outcome.signal.is_terminated() {
                                let mut guard = self.shared.lock();
                                guard.0.set_terminated(kernel, outcome.signal);
                                if outcome.signal == TerminationSignal::Fatal {
                                    fatal = Some(kernel);
                                }
                            }
                            if !runtime.internally_synchronized(kernel) {
                                if outcome.signal.is_terminated() {
                                    self.lsns[&kernel].release_terminated();
                                } else {
                                    self.lsns[&kernel].release(segment + 1);
                                }
                            }
                        }
                        if let Some(kernel) = fatal {
                            *error_slot.lock() = Some(RuntimeError::FatalTermination(kernel));
                            self.aborted.store(true, Ordering::Release);
                            return;
                        }
                        let mut guard = self.shared.lock();
                        let done = guard.0.has_pipeline_terminated();
                        if guard.1.observe(progress, done) {
                            let stuck = self.first_unterminated(&guard.0);
                            *error_slot.lock() = Some(RuntimeError::Deadlock(stuck));
                            self.aborted.store(true, Ordering::Release);
                            return;
                        }
                        if done {
                            self.aborted.store(true, Ordering::Release);
                            return;
                        }
                        debug!(segment, "segment complete");
                    }
                });
            }
        });
        if let Some(e) = error_slot.into_inner() {
            return Err(e);
        }
        let guard = self.shared.lock();
        Ok(TerminationCode::from(guard.0.pipeline_return_code()))
    }

    /// One thread per kernel, chained by waiting on the upstream kernel's
    /// LSN: position `i` only runs segment `s` once position `i - 1` has
    /// released segment `s + 1` (finished it). A kernel that terminates
    /// publishes a sentinel LSN rather than just stopping at its last
    /// segment number, so a downstream thread blocked in `acquire` on a
    /// later segment wakes up immediately instead of waiting on a release
    /// that will never come; it then keeps running its own segments until
    /// its own kernel reports termination.
    fn run_pipeline_parallel(&self, runtime: &dyn KernelRuntime) -> Result<TerminationCode> {
        let error_slot: Mutex<Option<RuntimeError>> = Mutex::new(None);
        std::thread::scope(|scope| {
            for (i, &kernel) in self.kernel_order.iter().enumerate() {
                scope.spawn(move || {
                    let mut segment = 0u64;
                    loop {
                        if self.aborted.load(Ordering::Acquire) {
                            return;
                        }
                        if self.shared.lock().0.is_terminated(kernel) {
                            return;
                        }
                        if i > 0 {
                            let upstream = self.kernel_order[i - 1];
                            self.lsns[&upstream].acquire(segment + 1);
                        }
                        let outcome = runtime.run_segment(kernel, segment);

                        if outcome.signal.is_terminated() {
                            self.lsns[&kernel].release_terminated();
                            let mut guard = self.shared.lock();
                            guard.0.set_terminated(kernel, outcome.signal);
                            if outcome.signal == TerminationSignal::Fatal {
                                *error_slot.lock() = Some(RuntimeError::FatalTermination(kernel));
                                self.aborted.store(true, Ordering::Release);
                            }
                            return;
                        }
                        self.lsns[&kernel].release(segment + 1);
                        segment += 1;
                    }
                });
            }
        });
        if let Some(e) = error_slot.into_inner() {
            return Err(e);
        }
        let guard = self.shared.lock();
        Ok(TerminationCode::from(guard.0.pipeline_return_code()))
    }

    fn first_unterminated(&self, tg: &TerminationGraph) -> KernelId {
        self.kernel_order
            .iter()
            .copied()
            .find(|&k| !tg.is_terminated(k))
            .unwrap_or(self.kernel_order[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_runtime::test_support::ScriptedRuntime;
    use streamforge_model::Vertex as TerminationVertex;

    fn linear_graph(kernels: &[KernelId]) -> TerminationGraph {
        let mut tg = TerminationGraph::new();
        tg.add_edge(TerminationVertex::PipelineInput, TerminationVertex::Kernel(kernels[0]));
        for w in kernels.windows(2) {
            tg.add_edge(TerminationVertex::Kernel(w[0]), TerminationVertex::Kernel(w[1]));
        }
        tg.add_edge(TerminationVertex::Kernel(*kernels.last().unwrap()), TerminationVertex::PipelineOutput);
        tg
    }

    #[test]
    fn single_threaded_runs_to_normal_completion() {
        let kernels = vec![KernelId(0), KernelId(1)];
        let tg = linear_graph(&kernels);
        let driver = PipelineDriver::new(kernels.clone(), tg);
        let mut script = HashMap::new();
        script.insert(KernelId(0), 3);
        script.insert(KernelId(1), 3);
        let runtime = ScriptedRuntime::new(script);
        let code = driver.run(&runtime, ThreadingMode::SingleThreaded, 1).unwrap();
        assert_eq!(code, TerminationCode::Normal);
    }

    #[test]
    fn segment_parallel_runs_to_normal_completion() {
        let kernels = vec![KernelId(0), KernelId(1), KernelId(2)];
        let tg = linear_graph(&kernels);
        let driver = PipelineDriver::new(kernels.clone(), tg);
        let mut script = HashMap::new();
        script.insert(KernelId(0), 5);
        script.insert(KernelId(1), 5);
        script.insert(KernelId(2), 5);
        let runtime = ScriptedRuntime::new(script);
        let code = driver.run(&runtime, ThreadingMode::SegmentParallel, 3).unwrap();
        assert_eq!(code, TerminationCode::Normal);
    }

    #[test]
    fn pipeline_parallel_runs_to_normal_completion() {
        let kernels = vec![KernelId(0), KernelId(1), KernelId(2)];
        let tg = linear_graph(&kernels);
        let driver = PipelineDriver::new(kernels.clone(), tg);
        let mut script = HashMap::new();
        script.insert(KernelId(0), 4);
        script.insert(KernelId(1), 4);
        script.insert(KernelId(2), 4);
        let runtime = ScriptedRuntime::new(script);
        let code = driver.run(&runtime, ThreadingMode::PipelineParallel, 1).unwrap();
        assert_eq!(code, TerminationCode::Normal);
    }

    #[test]
    fn pipeline_parallel_survives_staggered_termination() {
        let kernels = vec![KernelId(0), KernelId(1), KernelId(2)];
        let tg = linear_graph(&kernels);
        let driver = PipelineDriver::new(kernels.clone(), tg);
        let mut script = HashMap::new();
        script.insert(KernelId(0), 2);
        script.insert(KernelId(1), 5);
        script.insert(KernelId(2), 9);
        let runtime = ScriptedRuntime::new(script);
        let code = driver.run(&runtime, ThreadingMode::PipelineParallel, 1).unwrap();
        assert_eq!(code, TerminationCode::Normal);
    }

    #[test]
    fn single_threaded_detects_deadlock() {
        let kernels = vec![KernelId(0)];
        let tg = linear_graph(&kernels);
        let driver = PipelineDriver::new(kernels.clone(), tg);
        // never terminates and never reports progress: a stalled runtime.
        struct StuckRuntime;
        impl KernelRuntime for StuckRuntime {
            fn run_segment(&self, _kernel: KernelId, _segment: u64) -> crate::kernel_runtime::SegmentOutcome {
                crate::kernel_runtime::SegmentOutcome::stalled()
            }
        }
        let err = driver.run(&StuckRuntime, ThreadingMode::SingleThreaded, 1).unwrap_err();
        assert!(matches!(err, RuntimeError::Deadlock(_)));
    }
}
