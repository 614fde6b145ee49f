//! The relationship graph.
//!
//! A tagged arena graph over kernels, stream-sets, scalars, bindings and
//! callees. Node storage is per-kind (`Vec<KernelNode>`, …) keyed by the
//! arena ids in [`crate::ids`]; edges are adjacency lists keyed by
//! [`NodeRef`] rather than a pointer-based graph structure.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::ids::{BindingId, CalleeId, KernelId, ScalarId, StreamSetId};
use crate::rate::{Attributes, ProcessingRate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Kernel(KernelId),
    StreamSet(StreamSetId),
    Scalar(ScalarId),
    Binding(BindingId),
    Callee(CalleeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortType {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeReason {
    Explicit,
    ImplicitRegionSelector,
    ImplicitPopCount,
    Reference,
    /// Ordering edge inserted by the scheduling analyzer's orchestration pass.
    Ordering,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelationshipType {
    pub port_type: PortType,
    pub number: u32,
    pub reason: EdgeReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelNode {
    pub name: String,
    pub bindings: Vec<BindingId>,
    pub scalar_inputs: Vec<ScalarId>,
    pub internally_synchronized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSetNode {
    pub element_width: u32,
    pub lanes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarNode {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum BindingTarget {
    StreamSet(StreamSetId),
    Scalar(ScalarId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingNode {
    pub name: String,
    pub kernel: KernelId,
    pub port_type: PortType,
    pub rate: ProcessingRate,
    pub attrs: Attributes,
    pub target: Option<BindingTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalleeNode {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeRef,
    pub to: NodeRef,
    pub rel: RelationshipType,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub kernels: Vec<KernelNode>,
    pub stream_sets: Vec<StreamSetNode>,
    pub scalars: Vec<ScalarNode>,
    pub bindings: Vec<BindingNode>,
    pub callees: Vec<CalleeNode>,
    pub edges: Vec<Edge>,

    kernel_by_name: HashMap<String, KernelId>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: a kernel with the same name returns the existing vertex.
    pub fn add_kernel(&mut self, name: &str) -> KernelId {
        if let Some(&id) = self.kernel_by_name.get(name) {
            return id;
        }
        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(KernelNode {
            name: name.to_string(),
            bindings: Vec::new(),
            scalar_inputs: Vec::new(),
            internally_synchronized: false,
        });
        self.kernel_by_name.insert(name.to_string(), id);
        id
    }

    /// Stream-sets have no natural dedup key (each producer allocates its
    /// own); every call creates a fresh vertex.
    pub fn add_stream_set(&mut self, element_width: u32, lanes: u32) -> StreamSetId {
        let id = StreamSetId(self.stream_sets.len() as u32);
        self.stream_sets.push(StreamSetNode { element_width, lanes });
        id
    }

    pub fn add_scalar(&mut self, name: &str) -> ScalarId {
        let id = ScalarId(self.scalars.len() as u32);
        self.scalars.push(ScalarNode { name: name.to_string() });
        id
    }

    pub fn add_callee(&mut self, name: &str) -> CalleeId {
        let id = CalleeId(self.callees.len() as u32);
        self.callees.push(CalleeNode { name: name.to_string() });
        id
    }

    /// Fatal if `kernel` already has a binding with this name.
    pub fn add_binding(
        &mut self,
        kernel: KernelId,
        name: &str,
        port_type: PortType,
        rate: ProcessingRate,
        attrs: Attributes,
    ) -> Result<BindingId> {
        let existing = self.kernels[kernel.index()]
            .bindings
            .iter()
            .any(|&b| self.bindings[b.index()].name == name);
        if existing {
            return Err(ModelError::DuplicateBindingName(kernel, name.to_string()));
        }
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(BindingNode {
            name: name.to_string(),
            kernel,
            port_type,
            rate,
            attrs,
            target: None,
        });
        self.kernels[kernel.index()].bindings.push(id);
        self.edges.push(Edge {
            from: match port_type {
                PortType::Input => NodeRef::Binding(id),
                PortType::Output => NodeRef::Kernel(kernel),
            },
            to: match port_type {
                PortType::Input => NodeRef::Kernel(kernel),
                PortType::Output => NodeRef::Binding(id),
            },
            rel: RelationshipType { port_type, number: 0, reason: EdgeReason::Explicit },
        });
        Ok(id)
    }

    /// Connects a binding to the stream-set or scalar it reads/writes.
    /// Every binding must end up with exactly one such edge.
    pub fn connect_binding(&mut self, binding: BindingId, target: BindingTarget, reason: EdgeReason) {
        self.bindings[binding.index()].target = Some(target);
        let port_type = self.bindings[binding.index()].port_type;
        let to = match target {
            BindingTarget::StreamSet(s) => NodeRef::StreamSet(s),
            BindingTarget::Scalar(s) => NodeRef::Scalar(s),
        };
        let (from, to) = match port_type {
            // An output binding writes *to* the stream-set/scalar.
            PortType::Output => (NodeRef::Binding(binding), to),
            // An input binding reads *from* it.
            PortType::Input => (to, NodeRef::Binding(binding)),
        };
        self.edges.push(Edge {
            from,
            to,
            rel: RelationshipType { port_type, number: 0, reason },
        });
    }

    /// Records a reference edge (PartialSum/Relative rate dependency)
    /// between two bindings on the same kernel's input side.
    pub fn add_reference_edge(&mut self, from: BindingId, to: BindingId) {
        self.edges.push(Edge {
            from: NodeRef::Binding(from),
            to: NodeRef::Binding(to),
            rel: RelationshipType { port_type: PortType::Input, number: 0, reason: EdgeReason::Reference },
        });
    }

    /// Reference edges must form a forest: no binding may be the `to` of
    /// more than one reference edge, and there must be no cycle.
    pub fn check_reference_forest(&self) -> Result<()> {
        let mut indegree: HashMap<BindingId, u32> = HashMap::new();
        let mut adj: HashMap<BindingId, Vec<BindingId>> = HashMap::new();
        for e in &self.edges {
            if e.rel.reason != EdgeReason::Reference {
                continue;
            }
            if let (NodeRef::Binding(from), NodeRef::Binding(to)) = (e.from, e.to) {
                *indegree.entry(to).or_insert(0) += 1;
                adj.entry(from).or_default().push(to);
            }
        }
        // `add_reference_edge` doesn't enforce in-degree <= 1 itself, so
        // check it here before the cycle walk below.
        for (&to, &count) in &indegree {
            if count > 1 {
                return Err(ModelError::MultipleReferenceEdges(to));
            }
        }
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        for &start in adj.keys() {
            if done.contains(&start) {
                continue;
            }
            let mut stack = vec![(start, false)];
            while let Some((node, exiting)) = stack.pop() {
                if exiting {
                    visiting.remove(&node);
                    done.insert(node);
                    continue;
                }
                if visiting.contains(&node) {
                    return Err(ModelError::OrderingCycle(KernelId(node.0)));
                }
                if done.contains(&node) {
                    continue;
                }
                visiting.insert(node);
                stack.push((node, true));
                if let Some(children) = adj.get(&node) {
                    for &c in children {
                        stack.push((c, false));
                    }
                }
            }
        }
        Ok(())
    }

    /// `combineDuplicateKernels`: two kernels with identical name,
    /// identical bindings (incl. referenced streams), and identical
    /// scalar inputs are merged; edges redirect to the survivor.
    pub fn combine_duplicate_kernels(&mut self) {
        let mut signature_of = HashMap::<KernelId, String>::new();
        for (idx, k) in self.kernels.iter().enumerate() {
            let id = KernelId(idx as u32);
            let mut sig = k.name.clone();
            for &b in &k.bindings {
                let bn = &self.bindings[b.index()];
                sig.push('|');
                sig.push_str(&bn.name);
                sig.push(':');
                match bn.target {
                    Some(BindingTarget::StreamSet(s)) => sig.push_str(&format!("ss{}", s.0)),
                    Some(BindingTarget::Scalar(s)) => sig.push_str(&format!("sc{}", s.0)),
                    None => sig.push_str("none"),
                }
            }
            for &s in &k.scalar_inputs {
                sig.push_str(&format!("|in:sc{}", s.0));
            }
            signature_of.insert(id, sig);
        }

        let mut survivor_of_sig: HashMap<String, KernelId> = HashMap::new();
        let mut redirect: HashMap<KernelId, KernelId> = HashMap::new();
        for idx in 0..self.kernels.len() {
            let id = KernelId(idx as u32);
            let sig = signature_of[&id].clone();
            match survivor_of_sig.get(&sig) {
                Some(&survivor) if survivor != id => {
                    redirect.insert(id, survivor);
                }
                _ => {
                    survivor_of_sig.insert(sig, id);
                }
            }
        }
        if redirect.is_empty() {
            return;
        }
        for e in &mut self.edges {
            if let NodeRef::Kernel(k) = &mut e.from {
                if let Some(&s) = redirect.get(k) {
                    *k = s;
                }
            }
            if let NodeRef::Kernel(k) = &mut e.to {
                if let Some(&s) = redirect.get(k) {
                    *k = s;
                }
            }
        }
        for b in &mut self.bindings {
            if let Some(&s) = redirect.get(&b.kernel) {
                b.kernel = s;
            }
        }
    }

    /// `removeUnusedKernels`: forward-reachable from `pipeline_in` AND
    /// backward-reachable from `pipeline_out` kernels survive; the rest
    /// (and their bindings) are deleted.
    pub fn remove_unused_kernels(&mut self, pipeline_in: KernelId, pipeline_out: KernelId) {
        let forward = self.reachable_kernels(pipeline_in, true);
        let backward = self.reachable_kernels(pipeline_out, false);
        let keep: HashSet<KernelId> = forward.intersection(&backward).copied().collect();

        let mut new_bindings = Vec::new();
        let mut binding_remap: HashMap<BindingId, BindingId> = HashMap::new();
        let mut new_kernels = Vec::new();
        let mut kernel_remap: HashMap<KernelId, KernelId> = HashMap::new();

        for (idx, k) in self.kernels.iter().enumerate() {
            let old_id = KernelId(idx as u32);
            if !keep.contains(&old_id) {
                continue;
            }
            let new_id = KernelId(new_kernels.len() as u32);
            kernel_remap.insert(old_id, new_id);
            let mut nk = k.clone();
            nk.bindings = k
                .bindings
                .iter()
                .map(|&b| {
                    let nb = BindingId(new_bindings.len() as u32);
                    binding_remap.insert(b, nb);
                    let mut bn = self.bindings[b.index()].clone();
                    bn.kernel = new_id;
                    new_bindings.push(bn);
                    nb
                })
                .collect();
            new_kernels.push(nk);
        }

        let new_edges = self
            .edges
            .iter()
            .filter_map(|e| {
                let from = remap_node(e.from, &kernel_remap, &binding_remap)?;
                let to = remap_node(e.to, &kernel_remap, &binding_remap)?;
                Some(Edge { from, to, rel: e.rel })
            })
            .collect();

        self.kernels = new_kernels;
        self.bindings = new_bindings;
        self.edges = new_edges;
        self.kernel_by_name.retain(|_, id| kernel_remap.contains_key(id));
        for id in self.kernel_by_name.values_mut() {
            *id = kernel_remap[id];
        }
    }

    /// Walks the full node graph (kernels, bindings, stream-sets, scalars,
    /// callees) from `start`, following edges `from -> to` if `forward` or
    /// `to -> from` otherwise. A kernel-to-kernel connection is always
    /// mediated by `Kernel -> Binding -> StreamSet -> Binding -> Kernel`,
    /// so every intermediate node type must be traversed, not just the
    /// kernel endpoints, or reachability never crosses a stream-set.
    fn reachable_kernels(&self, start: KernelId, forward: bool) -> HashSet<KernelId> {
        let start_node = NodeRef::Kernel(start);
        let mut seen_nodes = HashSet::new();
        let mut kernels = HashSet::new();
        let mut queue = VecDeque::new();
        seen_nodes.insert(start_node);
        kernels.insert(start);
        queue.push_back(start_node);
        while let Some(n) = queue.pop_front() {
            for e in &self.edges {
                let (src, dst) = if forward { (e.from, e.to) } else { (e.to, e.from) };
                if src == n && seen_nodes.insert(dst) {
                    if let NodeRef::Kernel(k) = dst {
                        kernels.insert(k);
                    }
                    queue.push_back(dst);
                }
            }
        }
        kernels
    }

    /// Inserts synthetic kernels realizing `ImplicitRegionSelector` edges:
    /// any binding tagged with that reason but whose producer side is
    /// still a plain stream-set gets a synthetic "region selector" kernel
    /// spliced in between.
    pub fn add_region_selector_kernels(&mut self) {
        self.splice_synthetic_producer(EdgeReason::ImplicitRegionSelector, "__region_selector__");
    }

    /// Inserts synthetic kernels realizing `ImplicitPopCount` edges.
    pub fn add_pop_count_kernels(&mut self) {
        self.splice_synthetic_producer(EdgeReason::ImplicitPopCount, "__pop_count__");
    }

    fn splice_synthetic_producer(&mut self, reason: EdgeReason, prefix: &str) {
        let targets: Vec<StreamSetId> = self
            .edges
            .iter()
            .filter(|e| e.rel.reason == reason)
            .filter_map(|e| match e.to {
                NodeRef::StreamSet(s) => Some(s),
                _ => None,
            })
            .collect();
        for (i, ss) in targets.into_iter().enumerate() {
            let already_produced = self.edges.iter().any(|e| {
                matches!(e.from, NodeRef::Binding(_)) && e.to == NodeRef::StreamSet(ss)
            });
            if already_produced {
                continue;
            }
            let name = format!("{prefix}{i}");
            let k = self.add_kernel(&name);
            let out = self
                .add_binding(
                    k,
                    "out",
                    PortType::Output,
                    ProcessingRate::Fixed(crate::rate::Rational::new(1, 1)),
                    Attributes::new(),
                )
                .expect("synthetic kernel has no prior bindings");
            self.connect_binding(out, BindingTarget::StreamSet(ss), reason);
        }
    }

    /// Fatal if, after ordering-edge insertion, the graph projected onto
    /// kernels contains a cycle.
    pub fn detect_kernel_cycle(&self) -> Result<()> {
        let n = self.kernels.len();
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for e in &self.edges {
            if let (Some(a), Some(b)) = (node_kernel(e.from), node_kernel(e.to)) {
                adj[a.index()].push(b.index());
            }
        }
        let mut state = vec![0u8; n]; // 0 unvisited, 1 visiting, 2 done
        for start in 0..n {
            if state[start] != 0 {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            state[start] = 1;
            while let Some((node, child_idx)) = stack.pop() {
                if child_idx < adj[node].len() {
                    let next = adj[node][child_idx];
                    stack.push((node, child_idx + 1));
                    match state[next] {
                        0 => {
                            state[next] = 1;
                            stack.push((next, 0));
                        }
                        1 => return Err(ModelError::OrderingCycle(KernelId(next as u32))),
                        _ => {}
                    }
                } else {
                    state[node] = 2;
                }
            }
        }
        Ok(())
    }
}

fn node_kernel(n: NodeRef) -> Option<KernelId> {
    if let NodeRef::Kernel(k) = n {
        Some(k)
    } else {
        None
    }
}

fn remap_node(
    n: NodeRef,
    kernel_remap: &HashMap<KernelId, KernelId>,
    binding_remap: &HashMap<BindingId, BindingId>,
) -> Option<NodeRef> {
    match n {
        NodeRef::Kernel(k) => kernel_remap.get(&k).map(|&v| NodeRef::Kernel(v)),
        NodeRef::Binding(b) => binding_remap.get(&b).map(|&v| NodeRef::Binding(v)),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::Rational;

    fn fixed(n: u64) -> ProcessingRate {
        ProcessingRate::Fixed(Rational::new(n, 1))
    }

    #[test]
    fn add_kernel_is_idempotent() {
        let mut g = RelationshipGraph::new();
        let a = g.add_kernel("source");
        let b = g.add_kernel("source");
        assert_eq!(a, b);
        assert_eq!(g.kernels.len(), 1);
    }

    #[test]
    fn duplicate_binding_name_is_fatal() {
        let mut g = RelationshipGraph::new();
        let k = g.add_kernel("id");
        g.add_binding(k, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        let err = g
            .add_binding(k, "in", PortType::Input, fixed(1), Attributes::new())
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateBindingName(_, _)));
    }

    #[test]
    fn remove_unused_kernels_drops_dead_branch() {
        let mut g = RelationshipGraph::new();
        let src = g.add_kernel("source");
        let live = g.add_kernel("identity");
        let dead = g.add_kernel("dead_end");
        let sink = g.add_kernel("sink");

        let ss1 = g.add_stream_set(8, 1);
        let ss2 = g.add_stream_set(8, 1);
        let ss_dead = g.add_stream_set(8, 1);

        let src_out = g.add_binding(src, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(src_out, BindingTarget::StreamSet(ss1), EdgeReason::Explicit);

        let live_in = g.add_binding(live, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(live_in, BindingTarget::StreamSet(ss1), EdgeReason::Explicit);
        let live_out = g.add_binding(live, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(live_out, BindingTarget::StreamSet(ss2), EdgeReason::Explicit);

        let sink_in = g.add_binding(sink, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(sink_in, BindingTarget::StreamSet(ss2), EdgeReason::Explicit);

        // `dead` only connects to a stream-set nothing else touches.
        let dead_in = g.add_binding(dead, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(dead_in, BindingTarget::StreamSet(ss_dead), EdgeReason::Explicit);

        g.remove_unused_kernels(src, sink);

        assert_eq!(g.kernels.len(), 3);
        assert!(g.kernels.iter().all(|k| k.name != "dead_end"));
    }

    #[test]
    fn detect_kernel_cycle_reports_cycle() {
        let mut g = RelationshipGraph::new();
        let a = g.add_kernel("a");
        let b = g.add_kernel("b");
        let ss_ab = g.add_stream_set(8, 1);
        let ss_ba = g.add_stream_set(8, 1);

        let a_out = g.add_binding(a, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(a_out, BindingTarget::StreamSet(ss_ab), EdgeReason::Explicit);
        let b_in = g.add_binding(b, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(b_in, BindingTarget::StreamSet(ss_ab), EdgeReason::Explicit);

        let b_out = g.add_binding(b, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(b_out, BindingTarget::StreamSet(ss_ba), EdgeReason::Ordering);
        let a_in = g.add_binding(a, "in2", PortType::Input, fixed(1), Attributes::new()).unwrap();
        g.connect_binding(a_in, BindingTarget::StreamSet(ss_ba), EdgeReason::Ordering);

        assert!(g.detect_kernel_cycle().is_err());
    }
}
