//! Partitioning: a partition is a maximal group of kernels connected by
//! fixed-rate edges.

use std::collections::HashMap;

use streamforge_model::{BindingTarget, KernelId, RelationshipGraph, StreamSetId};

/// Union-find over kernel indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Partitions every kernel in `rg`, returning a dense `PartitionId`
/// (0-based `u32`) per kernel and the kernels grouped by partition in
/// declaration order.
///
/// A stream-set binds its producer and every consumer into one partition
/// only if *every* binding touching it is `Fixed` — a single `Bounded`,
/// `PartialSum`, `Relative`, `Greedy` or `Unknown` consumer on an
/// otherwise-fixed stream severs the partition at that edge.
pub fn partition_kernels(rg: &RelationshipGraph) -> (HashMap<KernelId, u32>, Vec<Vec<KernelId>>) {
    let n = rg.kernels.len();
    let mut uf = UnionFind::new(n);

    let mut touching: HashMap<StreamSetId, Vec<(KernelId, bool)>> = HashMap::new();
    for binding in &rg.bindings {
        if let Some(BindingTarget::StreamSet(ss)) = binding.target {
            touching.entry(ss).or_default().push((binding.kernel, binding.rate.is_fixed()));
        }
    }
    for kernels in touching.values() {
        if kernels.iter().all(|&(_, fixed)| fixed) {
            for w in kernels.windows(2) {
                uf.union(w[0].0.index(), w[1].0.index());
            }
        }
    }

    let mut root_to_partition: HashMap<usize, u32> = HashMap::new();
    let mut partition_of = HashMap::new();
    let mut groups: Vec<Vec<KernelId>> = Vec::new();
    for i in 0..n {
        let root = uf.find(i);
        let pid = *root_to_partition.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            (groups.len() - 1) as u32
        });
        partition_of.insert(KernelId(i as u32), pid);
        groups[pid as usize].push(KernelId(i as u32));
    }

    (partition_of, groups)
}
