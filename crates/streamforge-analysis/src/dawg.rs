//! The ordering DAWG: a minimal acyclic DFA over the set of orderings the
//! GA in [`crate::ordering`] has found to be equally good, so the segment
//! compiler can pick any one of them without the analyzer committing to a
//! single winner up front.
//!
//! Built as a trie first, then minimized bottom-up: two trie nodes with
//! identical `(terminal, children)` signatures are the same DFA state, so
//! a postorder pass that interns each node's signature into a shared
//! register collapses them.

use std::collections::HashMap;

use streamforge_model::KernelId;

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: HashMap<KernelId, usize>,
    terminal: bool,
}

/// Builds up a trie of orderings; call [`TrieBuilder::finish`] to collapse
/// it into a minimal [`Dawg`].
#[derive(Debug, Default)]
pub struct TrieBuilder {
    nodes: Vec<TrieNode>,
}

impl TrieBuilder {
    pub fn new() -> Self {
        Self { nodes: vec![TrieNode::default()] }
    }

    pub fn insert(&mut self, order: &[KernelId]) {
        let mut cur = 0usize;
        for &k in order {
            cur = *self.nodes[cur].children.entry(k).or_insert_with(|| {
                self.nodes.push(TrieNode::default());
                self.nodes.len() - 1
            });
        }
        self.nodes[cur].terminal = true;
    }

    /// Minimizes the trie into a [`Dawg`] by merging nodes with identical
    /// `(terminal, sorted children-by-minimized-target)` signatures,
    /// processed in postorder so every child is already minimized before
    /// its parent's signature is computed.
    pub fn finish(self) -> Dawg {
        let mut register: HashMap<(bool, Vec<(KernelId, usize)>), usize> = HashMap::new();
        let mut minimized: Vec<DawgNode> = Vec::new();
        let mut remap = vec![usize::MAX; self.nodes.len()];

        self.minimize_node(0, &mut remap, &mut minimized, &mut register);

        Dawg { nodes: minimized, root: remap[0] }
    }

    fn minimize_node(
        &self,
        idx: usize,
        remap: &mut Vec<usize>,
        minimized: &mut Vec<DawgNode>,
        register: &mut HashMap<(bool, Vec<(KernelId, usize)>), usize>,
    ) -> usize {
        if remap[idx] != usize::MAX {
            return remap[idx];
        }
        let node = &self.nodes[idx];
        let mut children: Vec<(KernelId, usize)> = node
            .children
            .iter()
            .map(|(&k, &child)| (k, self.minimize_node(child, remap, minimized, register)))
            .collect();
        children.sort_by_key(|(k, _)| k.index());

        let key = (node.terminal, children.clone());
        let state = *register.entry(key).or_insert_with(|| {
            minimized.push(DawgNode {
                children: children.into_iter().collect(),
                terminal: node.terminal,
            });
            minimized.len() - 1
        });
        remap[idx] = state;
        state
    }
}

#[derive(Debug, Clone)]
struct DawgNode {
    children: HashMap<KernelId, usize>,
    terminal: bool,
}

/// A minimized acyclic DFA over kernel orderings.
#[derive(Debug, Clone)]
pub struct Dawg {
    nodes: Vec<DawgNode>,
    root: usize,
}

impl Dawg {
    pub fn contains(&self, order: &[KernelId]) -> bool {
        let mut cur = self.root;
        for &k in order {
            match self.nodes[cur].children.get(&k) {
                Some(&next) => cur = next,
                None => return false,
            }
        }
        self.nodes[cur].terminal
    }

    /// Number of distinct DFA states after minimization.
    pub fn state_count(&self) -> usize {
        self.nodes.len()
    }
}
