//! Inter-partition ordering search.
//!
//! Partitions themselves form a dataflow graph (an edge `P -> Q` when some
//! stream-set produced in `P` is consumed in `Q`); this module solves the
//! soft inter-partition repetition ratios and then searches for the
//! lowest-cost Hamiltonian path over that graph with the ACO engine from
//! [`crate::engine`].

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use streamforge_model::{BindingTarget, KernelId, RelationshipGraph};

use crate::engine::AntColonyEngine;

/// The partition dataflow graph: `edges[p]` lists every partition `p`
/// feeds a stream-set into.
#[derive(Debug, Clone, Default)]
pub struct PartitionGraph {
    pub partitions: Vec<u32>,
    pub edges: HashMap<u32, HashSet<u32>>,
}

pub fn build_partition_graph(rg: &RelationshipGraph, partition_of: &HashMap<KernelId, u32>) -> PartitionGraph {
    let mut producer_partition: HashMap<u32, u32> = HashMap::new();
    for (idx, _) in rg.stream_sets.iter().enumerate() {
        let ss = streamforge_model::StreamSetId(idx as u32);
        if let Some(producer) = rg.bindings.iter().find(|b| {
            b.port_type == streamforge_model::PortType::Output
                && matches!(b.target, Some(BindingTarget::StreamSet(s)) if s == ss)
        }) {
            if let Some(&p) = partition_of.get(&producer.kernel) {
                producer_partition.insert(ss.0, p);
            }
        }
    }

    let mut edges: HashMap<u32, HashSet<u32>> = HashMap::new();
    for binding in &rg.bindings {
        if binding.port_type != streamforge_model::PortType::Input {
            continue;
        }
        let Some(BindingTarget::StreamSet(ss)) = binding.target else { continue };
        let Some(&producer_p) = producer_partition.get(&ss.0) else { continue };
        let Some(&consumer_p) = partition_of.get(&binding.kernel) else { continue };
        if producer_p != consumer_p {
            edges.entry(producer_p).or_default().insert(consumer_p);
        }
    }

    let mut partitions: HashSet<u32> = partition_of.values().copied().collect();
    partitions.extend(edges.keys().copied());
    let mut partitions: Vec<u32> = partitions.into_iter().collect();
    partitions.sort_unstable();

    PartitionGraph { partitions, edges }
}

/// Kendall-tau distance between two permutations of the same elements:
/// the number of pairwise order disagreements. Used to reward ACO tours
/// that stay close to the previous round's incumbent.
pub fn kendall_tau_distance(a: &[u32], b: &[u32]) -> u32 {
    let pos_b: HashMap<u32, usize> = b.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let mapped: Vec<usize> = a.iter().map(|v| pos_b[v]).collect();
    let mut inversions = 0u32;
    for i in 0..mapped.len() {
        for j in (i + 1)..mapped.len() {
            if mapped[i] > mapped[j] {
                inversions += 1;
            }
        }
    }
    inversions
}

/// Builds a tour by greedily walking pheromone-weighted unvisited
/// successors from a random start, falling back to any unvisited node
/// when the current node has no outgoing edge. The fallback keeps every
/// candidate a full Hamiltonian-length permutation; edges the graph
/// doesn't actually have are penalized by `violated_edge_count` in the
/// cost function rather than rejected during construction.
fn construct_tour(graph: &PartitionGraph, pheromone: &[Vec<f64>], rng: &mut StdRng) -> Vec<usize> {
    let n = graph.partitions.len();
    let index_of: HashMap<u32, usize> = graph.partitions.iter().enumerate().map(|(i, &p)| (p, i)).collect();
    let mut visited = vec![false; n];
    let mut tour = Vec::with_capacity(n);

    let mut current = rng.gen_range(0..n);
    visited[current] = true;
    tour.push(current);

    while tour.len() < n {
        let successors: Vec<usize> = graph
            .edges
            .get(&graph.partitions[current])
            .into_iter()
            .flatten()
            .filter_map(|p| index_of.get(p).copied())
            .filter(|&i| !visited[i])
            .collect();

        let next = if successors.is_empty() {
            (0..n).filter(|&i| !visited[i]).max_by(|&a, &b| {
                pheromone[current][a].partial_cmp(&pheromone[current][b]).unwrap()
            })
        } else {
            successors
                .into_iter()
                .max_by(|&a, &b| pheromone[current][a].partial_cmp(&pheromone[current][b]).unwrap())
        };
        let Some(next) = next else { break };
        visited[next] = true;
        tour.push(next);
        current = next;
    }
    tour
}

/// Runs Phase B's ACO search and returns the winning partition order.
pub fn search_partition_order(
    graph: &PartitionGraph,
    rng: &mut StdRng,
    ants: usize,
    decay: f64,
    floor: f64,
    max_rounds: usize,
) -> Vec<u32> {
    let n = graph.partitions.len();
    if n <= 1 {
        return graph.partitions.clone();
    }
    let mut engine = AntColonyEngine::new(n, ants, decay, floor, max_rounds);
    let mut incumbent: Vec<usize> = (0..n).collect();
    incumbent.shuffle(rng);

    let tour_indices = engine.run(
        rng,
        |pheromone, rng| construct_tour(graph, pheromone, rng),
        |tour| violated_edge_count(graph, tour) as f64 * 1000.0 + tour.len() as f64,
        |pheromone, tour, _cost| {
            let tau = {
                let a: Vec<u32> = tour.iter().map(|&i| graph.partitions[i]).collect();
                let b: Vec<u32> = incumbent.iter().map(|&i| graph.partitions[i]).collect();
                kendall_tau_distance(&a, &b)
            };
            let deposit = 1.0 / (1.0 + tau as f64);
            for w in tour.windows(2) {
                pheromone[w[0]][w[1]] += deposit;
            }
            if violated_edge_count(graph, tour) == 0 {
                incumbent = tour.to_vec();
            }
        },
    );

    tour_indices.into_iter().map(|i| graph.partitions[i]).collect()
}

fn violated_edge_count(graph: &PartitionGraph, tour: &[usize]) -> usize {
    let pos: HashMap<u32, usize> = tour.iter().enumerate().map(|(i, &p)| (graph.partitions[p], i)).collect();
    let mut violations = 0;
    for (&from, tos) in &graph.edges {
        for &to in tos {
            if let (Some(&fp), Some(&tp)) = (pos.get(&from), pos.get(&to)) {
                if fp >= tp {
                    violations += 1;
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamforge_model::{Attributes, EdgeReason, PortType, ProcessingRate, Rational};

    fn fixed(n: u64) -> ProcessingRate {
        ProcessingRate::Fixed(Rational::new(n, 1))
    }

    #[test]
    fn kendall_tau_zero_for_identical_permutations() {
        assert_eq!(kendall_tau_distance(&[1, 2, 3], &[1, 2, 3]), 0);
        assert_eq!(kendall_tau_distance(&[3, 2, 1], &[1, 2, 3]), 3);
    }

    #[test]
    fn partition_graph_has_edge_for_cross_partition_stream() {
        let mut rg = RelationshipGraph::new();
        let a = rg.add_kernel("a");
        let b = rg.add_kernel("b");
        let ss = rg.add_stream_set(8, 1);
        let a_out = rg.add_binding(a, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(a_out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
        let b_in = rg.add_binding(b, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(b_in, BindingTarget::StreamSet(ss), EdgeReason::Explicit);

        let mut partition_of = HashMap::new();
        partition_of.insert(a, 0u32);
        partition_of.insert(b, 1u32);
        let graph = build_partition_graph(&rg, &partition_of);
        assert!(graph.edges[&0].contains(&1));
    }

    #[test]
    fn search_partition_order_respects_precedence() {
        use rand::SeedableRng;
        let mut graph = PartitionGraph::default();
        graph.partitions = vec![0, 1, 2];
        graph.edges.insert(0, [1].into_iter().collect());
        graph.edges.insert(1, [2].into_iter().collect());
        let mut rng = StdRng::seed_from_u64(3);
        let order = search_partition_order(&graph, &mut rng, 6, 0.2, 0.01, 30);
        let pos: HashMap<u32, usize> = order.iter().enumerate().map(|(i, &p)| (p, i)).collect();
        assert!(pos[&0] < pos[&1]);
        assert!(pos[&1] < pos[&2]);
    }
}
