//! Termination graph data model.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::ids::KernelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationSignal {
    None,
    Aborted,
    Fatal,
}

impl TerminationSignal {
    pub fn is_terminated(self) -> bool {
        !matches!(self, TerminationSignal::None)
    }
}

/// Sentinel vertices flanking the kernel graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vertex {
    PipelineInput,
    Kernel(KernelId),
    PipelineOutput,
}

/// Vertices are kernels plus two sentinels; an edge means "the source's
/// termination may force the target's".
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TerminationGraph {
    edges: Vec<(Vertex, Vertex)>,
    signals: HashMap<KernelId, TerminationSignal>,
}

impl TerminationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: Vertex, to: Vertex) {
        self.edges.push((from, to));
    }

    /// `setTerminated`: stores the signal to the kernel's termination
    /// scalar. Once non-zero it must never be set back to `None`
    /// (termination monotonicity, invariant 4).
    pub fn set_terminated(&mut self, kernel: KernelId, signal: TerminationSignal) {
        let slot = self.signals.entry(kernel).or_insert(TerminationSignal::None);
        debug_assert!(
            !slot.is_terminated() || signal.is_terminated(),
            "kernel {kernel:?} termination signal regressed from terminated to None"
        );
        *slot = signal;
    }

    pub fn signal(&self, kernel: KernelId) -> TerminationSignal {
        self.signals.get(&kernel).copied().unwrap_or(TerminationSignal::None)
    }

    pub fn is_terminated(&self, kernel: KernelId) -> bool {
        self.signal(kernel).is_terminated()
    }

    /// `hasPipelineTerminated`: ANDs the termination signals of every
    /// kernel that can reach the pipeline-output sentinel.
    pub fn has_pipeline_terminated(&self) -> bool {
        let reaching = self.kernels_reaching_output();
        if reaching.is_empty() {
            return true;
        }
        reaching.iter().all(|&k| self.is_terminated(k))
    }

    fn kernels_reaching_output(&self) -> HashSet<KernelId> {
        let mut reach = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(Vertex::PipelineOutput);
        let mut seen = HashSet::new();
        seen.insert(Vertex::PipelineOutput);
        while let Some(v) = queue.pop_front() {
            for &(from, to) in &self.edges {
                if to == v && seen.insert(from) {
                    if let Vertex::Kernel(k) = from {
                        reach.insert(k);
                    }
                    queue.push_back(from);
                }
            }
        }
        reach
    }

    /// Aggregates the termination signals of all sink-reaching kernels
    /// into the pipeline's single return value: the worst (highest)
    /// severity among them, `Fatal` > `Aborted` > `None`.
    pub fn pipeline_return_code(&self) -> TerminationSignal {
        let reaching = self.kernels_reaching_output();
        let mut worst = TerminationSignal::None;
        for k in reaching {
            let s = self.signal(k);
            worst = match (worst, s) {
                (TerminationSignal::Fatal, _) | (_, TerminationSignal::Fatal) => TerminationSignal::Fatal,
                (TerminationSignal::Aborted, _) | (_, TerminationSignal::Aborted) => TerminationSignal::Aborted,
                _ => TerminationSignal::None,
            };
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_terminated_requires_all_sinks() {
        let mut g = TerminationGraph::new();
        let a = KernelId(0);
        let b = KernelId(1);
        g.add_edge(Vertex::PipelineInput, Vertex::Kernel(a));
        g.add_edge(Vertex::Kernel(a), Vertex::Kernel(b));
        g.add_edge(Vertex::Kernel(b), Vertex::PipelineOutput);

        assert!(!g.has_pipeline_terminated());
        g.set_terminated(a, TerminationSignal::None);
        assert!(!g.has_pipeline_terminated());
        g.set_terminated(b, TerminationSignal::Aborted);
        // a never terminated -> pipeline not done
        assert!(!g.has_pipeline_terminated());
        g.set_terminated(a, TerminationSignal::Fatal);
        assert!(g.has_pipeline_terminated());
        assert_eq!(g.pipeline_return_code(), TerminationSignal::Fatal);
    }
}
