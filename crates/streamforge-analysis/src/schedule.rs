//! Top-level scheduling orchestration.
//!
//! Wires partitioning, Phase A (intra-partition GA) and Phase B
//! (inter-partition ACO) together, then commits the winning total order
//! back into the relationship graph as `Ordering` edges so the rest of
//! the compiler sees one linear kernel sequence regardless of how it was
//! derived.

use std::collections::HashMap;

use rand::rngs::StdRng;
use streamforge_model::{Attributes, BindingTarget, EdgeReason, KernelId, PortType, ProcessingRate, Rational, RelationshipGraph};
use tracing::info;

use crate::buffer_graph::{identify_thread_local_buffers, BufferGraph};
use crate::dawg::{Dawg, TrieBuilder};
use crate::error::Result;
use crate::interpartition::{build_partition_graph, search_partition_order};
use crate::ordering::{build_dependency_graph, search_ordering};
use crate::partition::partition_kernels;
use crate::repetition::compute_repetition;

/// Tunable search parameters for the ordering and inter-partition search
/// phases. Defaults follow the scale used in the module's own tests; a
/// full pipeline compile should size these to partition count (see
/// `DESIGN.md` for the chosen defaults).
#[derive(Debug, Clone, Copy)]
pub struct ScheduleParams {
    pub ga_population: usize,
    pub ga_max_rounds: usize,
    pub ga_convergence_rounds: usize,
    pub aco_ants: usize,
    pub aco_decay: f64,
    pub aco_floor: f64,
    pub aco_max_rounds: usize,
    pub dawg_candidates_per_partition: usize,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            ga_population: 16,
            ga_max_rounds: 200,
            ga_convergence_rounds: 15,
            aco_ants: 12,
            aco_decay: 0.15,
            aco_floor: 0.01,
            aco_max_rounds: 100,
            dawg_candidates_per_partition: 4,
        }
    }
}

/// The output of Phase C: the final linear kernel order, each partition's
/// repetition vector, and a DAWG of near-optimal intra-partition orderings
/// per partition (kept for the segment compiler to pick alternatives from
/// without re-running the GA).
pub struct ScheduleResult {
    pub kernel_order: Vec<KernelId>,
    pub repetition: HashMap<KernelId, Rational>,
    pub partition_of: HashMap<KernelId, u32>,
    pub orderings_by_partition: HashMap<u32, Dawg>,
}

/// Runs Phases A, B and C and mutates `rg` in place, inserting one
/// `Ordering` edge per adjacent pair in the winning total order.
pub fn schedule(
    rg: &mut RelationshipGraph,
    bg: &mut BufferGraph,
    rng: &mut StdRng,
    params: &ScheduleParams,
) -> Result<ScheduleResult> {
    let (partition_of, groups) = partition_kernels(rg);
    info!(partitions = groups.len(), "partitioning complete");
    identify_thread_local_buffers(bg, &partition_of);

    let mut repetition = HashMap::new();
    let mut orderings_by_partition = HashMap::new();
    let mut partition_order_of_kernels: HashMap<u32, Vec<KernelId>> = HashMap::new();

    for (pid, kernels) in groups.iter().enumerate() {
        let pid = pid as u32;
        let rep = compute_repetition(rg, pid, kernels)?;
        repetition.extend(rep);

        let dep = build_dependency_graph(rg, kernels);
        let mut trie = TrieBuilder::new();
        let mut best_order = kernels.clone();
        for _ in 0..params.dawg_candidates_per_partition {
            let (order, _) = search_ordering(
                rg,
                &dep,
                rng,
                params.ga_population,
                params.ga_max_rounds,
                params.ga_convergence_rounds,
            );
            trie.insert(&order);
            best_order = order;
        }
        orderings_by_partition.insert(pid, trie.finish());
        partition_order_of_kernels.insert(pid, best_order);
    }

    let graph = build_partition_graph(rg, &partition_of);
    let partition_order = search_partition_order(
        &graph,
        rng,
        params.aco_ants,
        params.aco_decay,
        params.aco_floor,
        params.aco_max_rounds,
    );

    let mut kernel_order = Vec::new();
    for pid in partition_order {
        if let Some(order) = partition_order_of_kernels.get(&pid) {
            kernel_order.extend(order.iter().copied());
        }
    }

    commit_ordering_edges(rg, &kernel_order);
    rg.detect_kernel_cycle()?;

    Ok(ScheduleResult { kernel_order, repetition, partition_of, orderings_by_partition })
}

/// Inserts a synthetic `Fixed(1)` stream-set edge between each adjacent
/// pair in `order`, tagged `EdgeReason::Ordering`, so `detect_kernel_cycle`
/// and every downstream pass see one committed linear sequence.
fn commit_ordering_edges(rg: &mut RelationshipGraph, order: &[KernelId]) {
    for pair in order.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let ss = rg.add_stream_set(1, 1);
        let out = rg
            .add_binding(from, &format!("__order_{to}__"), PortType::Output, ProcessingRate::Fixed(Rational::new(1, 1)), Attributes::new());
        if let Ok(out) = out {
            rg.connect_binding(out, BindingTarget::StreamSet(ss), EdgeReason::Ordering);
        }
        let inp = rg
            .add_binding(to, &format!("__order_from_{from}__"), PortType::Input, ProcessingRate::Fixed(Rational::new(1, 1)), Attributes::new());
        if let Ok(inp) = inp {
            rg.connect_binding(inp, BindingTarget::StreamSet(ss), EdgeReason::Ordering);
        }
    }
}
