//! Intra-partition kernel ordering search.
//!
//! Builds the kernel dependency graph `D` for one partition, searches the
//! space of topological orderings with the genetic engine from
//! [`crate::engine`], scoring each candidate by an interval-graph
//! clique-weight estimate of live buffer memory, and hands the winning
//! orderings to [`crate::dawg`] for storage.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use streamforge_model::{BindingTarget, KernelId, RelationshipGraph};

use crate::engine::{EvolutionaryEngine, Phenotype};

/// The dependency graph `D` over one partition: `edges[k]` are the
/// kernels `k` must follow (its producers within the partition).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub kernels: Vec<KernelId>,
    pub predecessors: HashMap<KernelId, HashSet<KernelId>>,
}

/// Builds `D` from every stream-set edge whose producer and consumer are
/// both in `partition`.
pub fn build_dependency_graph(rg: &RelationshipGraph, partition: &[KernelId]) -> DependencyGraph {
    let in_partition: HashSet<KernelId> = partition.iter().copied().collect();
    let mut producer_of = HashMap::new();
    for binding in &rg.bindings {
        if !in_partition.contains(&binding.kernel) {
            continue;
        }
        if binding.port_type == streamforge_model::PortType::Output {
            if let Some(BindingTarget::StreamSet(ss)) = binding.target {
                producer_of.insert(ss, binding.kernel);
            }
        }
    }
    let mut predecessors: HashMap<KernelId, HashSet<KernelId>> =
        partition.iter().map(|&k| (k, HashSet::new())).collect();
    for binding in &rg.bindings {
        if !in_partition.contains(&binding.kernel) || binding.port_type != streamforge_model::PortType::Input {
            continue;
        }
        if let Some(BindingTarget::StreamSet(ss)) = binding.target {
            if let Some(&producer) = producer_of.get(&ss) {
                if producer != binding.kernel {
                    predecessors.entry(binding.kernel).or_default().insert(producer);
                }
            }
        }
    }
    DependencyGraph { kernels: partition.to_vec(), predecessors }
}

/// A candidate ordering: a permutation of the partition's kernels,
/// respecting `D`'s precedence constraints.
#[derive(Debug, Clone)]
pub struct OrderingCandidate {
    pub order: Vec<KernelId>,
    score: f64,
}

impl Phenotype for OrderingCandidate {
    fn fitness(&self) -> f64 {
        self.score
    }
}

/// Interval-graph clique-weight memory score: a stream-set is "live" from
/// its producer's position to its last consumer's position in `order`;
/// the score is the sum, over every position, of the number of
/// stream-sets live at that position (an upper bound on peak concurrent
/// buffer count, cheap to compute without simulating allocation).
pub fn memory_score(rg: &RelationshipGraph, order: &[KernelId]) -> f64 {
    let position: HashMap<KernelId, usize> = order.iter().enumerate().map(|(i, &k)| (k, i)).collect();
    let mut producer_pos: HashMap<u32, usize> = HashMap::new();
    let mut last_consumer_pos: HashMap<u32, usize> = HashMap::new();

    for binding in &rg.bindings {
        let Some(BindingTarget::StreamSet(ss)) = binding.target else { continue };
        let Some(&pos) = position.get(&binding.kernel) else { continue };
        match binding.port_type {
            streamforge_model::PortType::Output => {
                producer_pos.insert(ss.0, pos);
            }
            streamforge_model::PortType::Input => {
                let e = last_consumer_pos.entry(ss.0).or_insert(pos);
                *e = (*e).max(pos);
            }
        }
    }

    let mut live_count = vec![0u32; order.len()];
    for (ss, &p_pos) in &producer_pos {
        let end = *last_consumer_pos.get(ss).unwrap_or(&p_pos);
        for slot in live_count.iter_mut().take(end + 1).skip(p_pos) {
            *slot += 1;
        }
    }
    live_count.iter().map(|&c| c as f64).sum()
}

fn is_topologically_valid(order: &[KernelId], dep: &DependencyGraph) -> bool {
    let position: HashMap<KernelId, usize> = order.iter().enumerate().map(|(i, &k)| (k, i)).collect();
    for (&k, preds) in &dep.predecessors {
        let Some(&kp) = position.get(&k) else { continue };
        for p in preds {
            if let Some(&pp) = position.get(p) {
                if pp >= kp {
                    return false;
                }
            }
        }
    }
    true
}

/// Repairs an order that violates `D` by stably moving every kernel after
/// all of its predecessors (a single topological-sort pass seeded by the
/// crossover child's relative order, preserving as much of it as possible).
fn repair(order: Vec<KernelId>, dep: &DependencyGraph) -> Vec<KernelId> {
    let mut remaining: Vec<KernelId> = order;
    let mut placed: HashSet<KernelId> = HashSet::new();
    let mut result = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut progressed = false;
        let mut next_remaining = Vec::new();
        for k in remaining {
            let ready = dep
                .predecessors
                .get(&k)
                .map(|preds| preds.iter().all(|p| placed.contains(p)))
                .unwrap_or(true);
            if ready {
                placed.insert(k);
                result.push(k);
                progressed = true;
            } else {
                next_remaining.push(k);
            }
        }
        remaining = next_remaining;
        if !progressed && !remaining.is_empty() {
            // A residual cycle should have been caught by
            // `RelationshipGraph::detect_kernel_cycle` before reaching
            // here; fall back to declaration order rather than loop forever.
            result.extend(remaining);
            break;
        }
    }
    result
}

fn topology_respecting_crossover(
    a: &OrderingCandidate,
    b: &OrderingCandidate,
    dep: &DependencyGraph,
    rng: &mut StdRng,
) -> Vec<KernelId> {
    let n = a.order.len();
    if n < 2 {
        return a.order.clone();
    }
    let cut = rng.gen_range(1..n);
    let mut child: Vec<KernelId> = a.order[..cut].to_vec();
    let taken: HashSet<KernelId> = child.iter().copied().collect();
    for &k in &b.order {
        if !taken.contains(&k) {
            child.push(k);
        }
    }
    if is_topologically_valid(&child, dep) {
        child
    } else {
        repair(child, dep)
    }
}

fn sub_range_shuffle_mutation(order: &mut Vec<KernelId>, dep: &DependencyGraph, rng: &mut StdRng) {
    let n = order.len();
    if n < 3 {
        return;
    }
    let start = rng.gen_range(0..n - 1);
    let end = rng.gen_range(start + 1..n);
    order[start..=end].shuffle(rng);
    if !is_topologically_valid(order, dep) {
        *order = repair(std::mem::take(order), dep);
    }
}

/// Runs Phase A for one partition, returning the best ordering found and
/// whether the GA converged before exhausting `max_rounds`.
pub fn search_ordering(
    rg: &RelationshipGraph,
    dep: &DependencyGraph,
    rng: &mut StdRng,
    population_size: usize,
    max_rounds: usize,
    convergence_rounds: usize,
) -> (Vec<KernelId>, bool) {
    let base = repair(dep.kernels.clone(), dep);
    let mut population = Vec::with_capacity(population_size);
    for _ in 0..population_size {
        let mut order = base.clone();
        order.shuffle(rng);
        let order = if is_topologically_valid(&order, dep) { order } else { repair(order, dep) };
        let score = memory_score(rg, &order);
        population.push(OrderingCandidate { order, score });
    }

    let mut engine = EvolutionaryEngine::new(population, 3, 0.3, max_rounds, convergence_rounds);
    let (best, converged) = engine.run(
        rng,
        |a, b, rng| {
            let order = topology_respecting_crossover(a, b, dep, rng);
            let score = memory_score(rg, &order);
            OrderingCandidate { order, score }
        },
        |child, rng| {
            sub_range_shuffle_mutation(&mut child.order, dep, rng);
            child.score = memory_score(rg, &child.order);
        },
    );
    (best.order, converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use streamforge_model::{Attributes, EdgeReason, PortType, ProcessingRate, Rational};

    fn fixed(n: u64) -> ProcessingRate {
        ProcessingRate::Fixed(Rational::new(n, 1))
    }

    #[test]
    fn dependency_graph_orders_producer_before_consumer() {
        let mut rg = RelationshipGraph::new();
        let a = rg.add_kernel("a");
        let b = rg.add_kernel("b");
        let ss = rg.add_stream_set(8, 1);
        let a_out = rg.add_binding(a, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(a_out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
        let b_in = rg.add_binding(b, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(b_in, BindingTarget::StreamSet(ss), EdgeReason::Explicit);

        let dep = build_dependency_graph(&rg, &[a, b]);
        assert!(dep.predecessors[&b].contains(&a));
        assert!(dep.predecessors[&a].is_empty());
    }

    #[test]
    fn search_ordering_respects_precedence() {
        let mut rg = RelationshipGraph::new();
        let a = rg.add_kernel("a");
        let b = rg.add_kernel("b");
        let c = rg.add_kernel("c");
        let ss1 = rg.add_stream_set(8, 1);
        let ss2 = rg.add_stream_set(8, 1);
        let a_out = rg.add_binding(a, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(a_out, BindingTarget::StreamSet(ss1), EdgeReason::Explicit);
        let b_in = rg.add_binding(b, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(b_in, BindingTarget::StreamSet(ss1), EdgeReason::Explicit);
        let b_out = rg.add_binding(b, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(b_out, BindingTarget::StreamSet(ss2), EdgeReason::Explicit);
        let c_in = rg.add_binding(c, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(c_in, BindingTarget::StreamSet(ss2), EdgeReason::Explicit);

        let dep = build_dependency_graph(&rg, &[a, b, c]);
        let mut rng = StdRng::seed_from_u64(1);
        let (order, _) = search_ordering(&rg, &dep, &mut rng, 8, 20, 5);
        assert!(is_topologically_valid(&order, &dep));
        let pos: HashMap<_, _> = order.iter().enumerate().map(|(i, &k)| (k, i)).collect();
        assert!(pos[&a] < pos[&b]);
        assert!(pos[&b] < pos[&c]);
    }
}
