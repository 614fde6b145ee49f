//! Repetition vector solver: the second step of intra-partition scheduling.
//!
//! Within one partition every stream-set edge carries a `Fixed` rate (by
//! construction of [`crate::partition::partition_kernels`]), so for every
//! producer/consumer pair `n_p · rate_out = n_c · rate_in` must hold. This
//! is a linear-rational system over one free scale per connected
//! component; we propagate ratios by BFS from an arbitrary root and reject
//! the partition if two paths disagree.

use std::collections::{HashMap, VecDeque};

use num_integer::Integer;
use streamforge_model::{BindingTarget, KernelId, ProcessingRate, Rational, RelationshipGraph, StreamSetId};

use crate::error::{AnalysisError, Result};

/// Solves the repetition vector for one partition, returning `n_k` for
/// every kernel in it. Scaled so every entry has denominator 1 (the
/// smallest integer repetition vector satisfying the rate equations).
pub fn compute_repetition(
    rg: &RelationshipGraph,
    partition_id: u32,
    partition: &[KernelId],
) -> Result<HashMap<KernelId, Rational>> {
    if partition.is_empty() {
        return Ok(HashMap::new());
    }

    // in-partition stream-sets: producer binding -> (stream_set, rate)
    let mut producer_rate: HashMap<StreamSetId, (KernelId, Rational)> = HashMap::new();
    let mut consumer_rates: HashMap<StreamSetId, Vec<(KernelId, Rational)>> = HashMap::new();
    let in_partition: std::collections::HashSet<KernelId> = partition.iter().copied().collect();

    for binding in &rg.bindings {
        if !in_partition.contains(&binding.kernel) {
            continue;
        }
        let Some(BindingTarget::StreamSet(ss)) = binding.target else { continue };
        let ProcessingRate::Fixed(r) = binding.rate else {
            return Err(AnalysisError::Infeasible(partition_id));
        };
        match binding.port_type {
            streamforge_model::PortType::Output => {
                producer_rate.insert(ss, (binding.kernel, r));
            }
            streamforge_model::PortType::Input => {
                consumer_rates.entry(ss).or_default().push((binding.kernel, r));
            }
        }
    }

    let mut adj: HashMap<KernelId, Vec<(KernelId, Rational)>> = HashMap::new();
    for (ss, (producer, p_rate)) in &producer_rate {
        let Some(consumers) = consumer_rates.get(ss) else { continue };
        for &(consumer, c_rate) in consumers {
            if !in_partition.contains(&consumer) {
                continue;
            }
            // n_consumer = n_producer * p_rate / c_rate
            let fwd = *p_rate / c_rate;
            adj.entry(*producer).or_default().push((consumer, fwd));
            adj.entry(consumer).or_default().push((*producer, c_rate / *p_rate));
        }
    }

    let mut repetition: HashMap<KernelId, Rational> = HashMap::new();
    for &root in partition {
        if repetition.contains_key(&root) {
            continue;
        }
        repetition.insert(root, Rational::new(1, 1));
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(k) = queue.pop_front() {
            let n_k = repetition[&k];
            let Some(neighbors) = adj.get(&k) else { continue };
            for &(next, ratio) in neighbors {
                let expected = n_k * ratio;
                match repetition.get(&next) {
                    Some(&existing) if existing != expected => {
                        return Err(AnalysisError::Infeasible(partition_id));
                    }
                    Some(_) => {}
                    None => {
                        repetition.insert(next, expected);
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    scale_to_integers(&mut repetition);
    Ok(repetition)
}

/// Scales every entry by the LCM of denominators so the smallest valid
/// integer repetition vector is produced.
fn scale_to_integers(repetition: &mut HashMap<KernelId, Rational>) {
    let lcm = repetition
        .values()
        .fold(1u64, |acc, r| acc.lcm(r.denom()));
    for v in repetition.values_mut() {
        *v = Rational::new(v.numer() * (lcm / v.denom()), 1);
    }
}
