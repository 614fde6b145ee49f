//! Consumer / termination bookkeeping.
//!
//! Builds the consumer graph from the relationship graph (one
//! [`ConsumerNode`] per stream-set, one edge per producer-output/
//! consumer-input pair) and the termination graph (one edge per
//! kernel-to-kernel dataflow dependency plus the pipeline input/output
//! sentinels), then exposes the per-segment bookkeeping calls the
//! segment compiler's `kernel-loop-exit`/`kernel-terminated` blocks need.

use std::collections::HashMap;

use streamforge_model::{
    BindingTarget, ConsumerNode, KernelId, PortType, RelationshipGraph, StreamSetId, TerminationGraph, TerminationVertex,
};
use tracing::warn;

/// Consumer-side bookkeeping for every stream-set in the graph.
#[derive(Debug, Default)]
pub struct ConsumerGraph {
    pub nodes: HashMap<StreamSetId, ConsumerNode>,
    /// Consumer kernels in binding-declaration order, matching the index
    /// each `ConsumerNode::report` call expects.
    pub consumer_order: HashMap<StreamSetId, Vec<KernelId>>,
}

/// Consumer graph construction: one edge per (producer-output,
/// consumer-input) pair, labeled by the consumer's index.
pub fn build_consumer_graph(rg: &RelationshipGraph) -> ConsumerGraph {
    let mut consumer_order: HashMap<StreamSetId, Vec<KernelId>> = HashMap::new();
    for binding in &rg.bindings {
        if binding.port_type != PortType::Input {
            continue;
        }
        if let Some(BindingTarget::StreamSet(ss)) = binding.target {
            consumer_order.entry(ss).or_default().push(binding.kernel);
        }
    }
    let nodes = consumer_order
        .iter()
        .map(|(&ss, kernels)| (ss, ConsumerNode::new(ss, kernels.clone())))
        .collect();
    ConsumerGraph { nodes, consumer_order }
}

impl ConsumerGraph {
    /// At consumer `kernel`'s `kernel-loop-exit`, records its processed
    /// count against `stream_set`. Returns the stream-set's new
    /// consumed-count once all consumers have reported this segment
    /// (the minimum across consumers), or `None` if some consumer
    /// hasn't reported yet.
    pub fn report(&mut self, stream_set: StreamSetId, kernel: KernelId, processed: u64) -> Option<u64> {
        let order = self.consumer_order.get(&stream_set)?;
        let idx = order.iter().position(|&k| k == kernel)?;
        let node = self.nodes.get_mut(&stream_set)?;
        if node.report(idx, processed) {
            Some(node.consumed_count)
        } else {
            None
        }
    }

    pub fn start_segment(&mut self, stream_set: StreamSetId) {
        if let Some(node) = self.nodes.get_mut(&stream_set) {
            node.start_segment();
        }
    }
}

/// Builds the termination graph's skeleton: a `PipelineInput` vertex, a
/// `PipelineOutput` vertex, and a `Kernel` vertex per kernel, wired by
/// every stream-set dataflow edge plus the two pipeline sentinels.
pub fn build_termination_graph(rg: &RelationshipGraph) -> TerminationGraph {
    let mut tg = TerminationGraph::default();
    let kernel_count = rg.kernels.len();

    let mut producer_of: HashMap<StreamSetId, KernelId> = HashMap::new();
    for binding in &rg.bindings {
        if binding.port_type == PortType::Output {
            if let Some(BindingTarget::StreamSet(ss)) = binding.target {
                producer_of.insert(ss, binding.kernel);
            }
        }
    }

    let mut has_producer = vec![false; kernel_count];
    let mut has_consumer = vec![false; kernel_count];
    for binding in &rg.bindings {
        let Some(BindingTarget::StreamSet(ss)) = binding.target else { continue };
        match binding.port_type {
            PortType::Output => has_producer[binding.kernel.index()] = true,
            PortType::Input => {
                has_consumer[binding.kernel.index()] = true;
                if let Some(&producer) = producer_of.get(&ss) {
                    tg.add_edge(TerminationVertex::Kernel(producer), TerminationVertex::Kernel(binding.kernel));
                }
            }
        }
    }

    for (idx, _) in rg.kernels.iter().enumerate() {
        let k = KernelId(idx as u32);
        if !has_consumer[idx] {
            tg.add_edge(TerminationVertex::PipelineInput, TerminationVertex::Kernel(k));
        }
        if !has_producer[idx] {
            tg.add_edge(TerminationVertex::Kernel(k), TerminationVertex::PipelineOutput);
        }
    }

    tg
}

/// Deadlock detection: a full segment with no progress across the whole
/// pipeline, observed twice in a row while some sink is still
/// unterminated, is a fatal assertion.
#[derive(Debug, Default)]
pub struct DeadlockWatch {
    consecutive_stalls: u32,
}

impl DeadlockWatch {
    /// Call once per completed segment. Returns `true` when the
    /// deadlock assertion should fire.
    pub fn observe_segment(&mut self, pipeline_progress: bool, pipeline_terminated: bool) -> bool {
        if pipeline_terminated {
            self.consecutive_stalls = 0;
            return false;
        }
        if pipeline_progress {
            self.consecutive_stalls = 0;
            false
        } else {
            self.consecutive_stalls += 1;
            if self.consecutive_stalls >= 2 {
                warn!("dead lock detected");
                true
            } else {
                false
            }
        }
    }
}
