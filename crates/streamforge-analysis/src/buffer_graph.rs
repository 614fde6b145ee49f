//! Buffer graph derivation: per-stream-set rate normalization,
//! symbolic-rate classing, thread-local buffer detection and copy-back /
//! look-ahead sizing.

use std::collections::HashMap;

use streamforge_model::{
    AttributeKind, BindingId, BindingTarget, BufferNode, BufferRateData, BufferType, KernelId,
    PortType, ProcessingRate, Rational, RelationshipGraph, StreamSetId,
};
use tracing::{debug, trace};

use crate::error::{AnalysisError, Result};

/// The buffer graph: one [`BufferNode`] per stream-set plus the
/// producer/consumer [`BufferRateData`] edges attached to it.
#[derive(Debug, Clone, Default)]
pub struct BufferGraph {
    pub nodes: HashMap<StreamSetId, BufferNode>,
    /// All edges touching a stream-set, producer first (if present).
    pub edges: HashMap<StreamSetId, Vec<BufferRateData>>,
    pub producer: HashMap<StreamSetId, KernelId>,
    pub consumers: HashMap<StreamSetId, Vec<KernelId>>,
}

impl BufferGraph {
    pub fn node(&self, s: StreamSetId) -> &BufferNode {
        self.nodes.get(&s).expect("stream-set has no buffer node")
    }

    pub fn node_mut(&mut self, s: StreamSetId) -> &mut BufferNode {
        self.nodes.get_mut(&s).expect("stream-set has no buffer node")
    }
}

/// Resolves a binding's rate to normalized (min, max) per-stride flow.
/// `lookup_ref` resolves a `PartialSum`/`Relative` reference binding's
/// own (min, max).
fn normalize_rate(
    rate: &ProcessingRate,
    lookup_ref: impl Fn(BindingId) -> (Rational, Rational),
) -> (Rational, Rational) {
    match rate {
        ProcessingRate::Fixed(r) => (*r, *r),
        ProcessingRate::Bounded(lo, hi) => (*lo, *hi),
        ProcessingRate::PartialSum(r) => {
            let (_, hi) = lookup_ref(*r);
            (Rational::new(0, 1), hi)
        }
        ProcessingRate::Relative(r, factor) => {
            let (lo, hi) = lookup_ref(*r);
            (lo * factor, hi * factor)
        }
        ProcessingRate::Greedy(lo) => (*lo, streamforge_model::rate::UNBOUNDED),
        ProcessingRate::Unknown => (Rational::new(0, 1), streamforge_model::rate::UNBOUNDED),
    }
}

/// Builds the buffer graph from the relationship graph. Rejects `Greedy`
/// on any output binding at compile time, since an unbounded producer
/// with no consumer-side bound makes buffer sizing unsolvable.
pub fn build_buffer_graph(rg: &RelationshipGraph) -> Result<BufferGraph> {
    let mut bg = BufferGraph::default();

    for (idx, ss) in rg.stream_sets.iter().enumerate() {
        let _ = ss;
        bg.nodes.insert(StreamSetId(idx as u32), BufferNode::new(StreamSetId(idx as u32)));
    }

    let lookup_ref = |b: BindingId| -> (Rational, Rational) {
        let bn = &rg.bindings[b.index()];
        bn.rate
            .self_bounds()
            .unwrap_or((Rational::new(0, 1), streamforge_model::rate::UNBOUNDED))
    };

    for (idx, binding) in rg.bindings.iter().enumerate() {
        let bid = BindingId(idx as u32);
        let target = match binding.target {
            Some(BindingTarget::StreamSet(s)) => s,
            _ => continue,
        };

        if binding.port_type == PortType::Output && binding.rate.is_greedy() {
            return Err(AnalysisError::GreedyOutput(bid));
        }

        let (min_rate, max_rate) = normalize_rate(&binding.rate, lookup_ref);
        let data = BufferRateData {
            kernel: binding.kernel,
            stream_set: target,
            min_rate,
            max_rate,
            min_expected_flow: Rational::new(0, 1),
            max_expected_flow: Rational::new(0, 1),
            min_space_per_segment: min_rate,
            max_space_per_segment: max_rate,
        };
        bg.edges.entry(target).or_default().push(data);

        match binding.port_type {
            PortType::Output => {
                bg.producer.insert(target, binding.kernel);
            }
            PortType::Input => {
                bg.consumers.entry(target).or_default().push(binding.kernel);
            }
        }

        let node = bg.node_mut(target);
        if binding.port_type == PortType::Input {
            node.look_ahead = node.look_ahead.max(binding.attrs.look_ahead_k());
            node.look_behind = node.look_behind.max(binding.attrs.look_behind_k());
        }
    }

    identify_symbolic_rates(&mut bg);

    debug!(stream_sets = bg.nodes.len(), "buffer graph built");
    Ok(bg)
}

/// `identifySymbolicRates`: two ports over the same stream and
/// the same rate expression share an equivalence class id, letting the
/// segment compiler skip redundant capacity re-checks.
fn identify_symbolic_rates(bg: &mut BufferGraph) {
    let mut next_class: u32 = 0;
    let mut class_of: HashMap<(StreamSetId, String), u32> = HashMap::new();

    for (&ss, edges) in bg.edges.iter() {
        for e in edges {
            let key = (ss, format!("{}/{}", e.min_rate, e.max_rate));
            let class = *class_of.entry(key).or_insert_with(|| {
                let c = next_class;
                next_class += 1;
                c
            });
            trace!(stream_set = ?ss, class, "symbolic rate assigned");
            let node = bg.nodes.get_mut(&ss).unwrap();
            if node.symbolic_rate_class.is_none() {
                node.symbolic_rate_class = Some(class);
            }
        }
    }
}

/// `computeDataFlow`: propagates min/max expected flow per
/// segment using each kernel's partition repetition count.
pub fn compute_data_flow(bg: &mut BufferGraph, repetition: &HashMap<KernelId, Rational>) {
    for edges in bg.edges.values_mut() {
        for e in edges.iter_mut() {
            let n = repetition.get(&e.kernel).copied().unwrap_or(Rational::new(1, 1));
            e.min_expected_flow = e.min_rate * n;
            e.max_expected_flow = if e.max_rate == streamforge_model::rate::UNBOUNDED {
                streamforge_model::rate::UNBOUNDED
            } else {
                e.max_rate * n
            };
        }
    }
    for (&ss, node) in bg.nodes.iter_mut() {
        let Some(edges) = bg.edges.get(&ss) else { continue };
        node.lower_flow = edges.iter().map(|e| e.min_expected_flow).fold(Rational::new(0, 1), |a, b| a.max(b));
        node.upper_flow = edges
            .iter()
            .map(|e| e.max_expected_flow)
            .fold(Rational::new(0, 1), |a, b| {
                if a == streamforge_model::rate::UNBOUNDED || b == streamforge_model::rate::UNBOUNDED {
                    streamforge_model::rate::UNBOUNDED
                } else {
                    a.max(b)
                }
            });
    }
}

/// `identifyThreadLocalBuffers`: a stream-set produced and
/// consumed wholly inside one partition, with no look-behind requirement
/// and a bounded consumer rate, is thread-local rather than shared.
pub fn identify_thread_local_buffers(bg: &mut BufferGraph, partition_of: &HashMap<KernelId, u32>) {
    let stream_sets: Vec<StreamSetId> = bg.nodes.keys().copied().collect();
    for ss in stream_sets {
        let Some(&producer) = bg.producer.get(&ss) else { continue };
        let Some(consumers) = bg.consumers.get(&ss) else { continue };
        let Some(&p_partition) = partition_of.get(&producer) else { continue };
        let same_partition = consumers.iter().all(|c| partition_of.get(c) == Some(&p_partition));
        let node = bg.node(ss);
        let bounded_consumers = bg
            .edges
            .get(&ss)
            .map(|edges| edges.iter().all(|e| e.max_rate != streamforge_model::rate::UNBOUNDED))
            .unwrap_or(true);
        if same_partition && node.look_behind == 0 && bounded_consumers {
            bg.node_mut(ss).buffer_type = BufferType::ThreadLocal;
        }
    }
}

/// `requiresCopyBack` / `requiresLookAhead` plus the copy-back
/// span policy: `N` = largest consumer `LookAhead` + max consumer stride.
pub fn resolve_copy_back_and_look_ahead(
    bg: &mut BufferGraph,
    max_consumer_stride: impl Fn(StreamSetId) -> u64,
) {
    let stream_sets: Vec<StreamSetId> = bg.nodes.keys().copied().collect();
    for ss in stream_sets {
        let look_ahead = bg.node(ss).look_ahead;
        if look_ahead > 0 {
            let stride = max_consumer_stride(ss);
            bg.node_mut(ss).copy_back = look_ahead + stride;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamforge_model::{Attributes, EdgeReason, PortType, RelationshipGraph};

    fn fixed(n: u64) -> ProcessingRate {
        ProcessingRate::Fixed(Rational::new(n, 1))
    }

    #[test]
    fn rejects_greedy_output() {
        let mut rg = RelationshipGraph::new();
        let k = rg.add_kernel("k");
        let ss = rg.add_stream_set(8, 1);
        let out = rg
            .add_binding(k, "out", PortType::Output, ProcessingRate::Greedy(Rational::new(1, 1)), Attributes::new())
            .unwrap();
        rg.connect_binding(out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
        assert!(build_buffer_graph(&rg).is_err());
    }

    #[test]
    fn fixed_rate_normalizes_to_equal_bounds() {
        let mut rg = RelationshipGraph::new();
        let k = rg.add_kernel("k");
        let ss = rg.add_stream_set(8, 1);
        let out = rg.add_binding(k, "out", PortType::Output, fixed(3), Attributes::new()).unwrap();
        rg.connect_binding(out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
        let bg = build_buffer_graph(&rg).unwrap();
        let e = &bg.edges[&ss][0];
        assert_eq!(e.min_rate, Rational::new(3, 1));
        assert_eq!(e.max_rate, Rational::new(3, 1));
    }
}
