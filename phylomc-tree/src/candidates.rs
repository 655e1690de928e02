//! Legal attachment points for fixed-age prune-and-regraft.

use crate::tree::{NodeId, TimeTree};

/// Nodes that can be pruned: not the root and not a child of the root.
///
/// Pruning such a node detaches its parent, which always has a parent of its
/// own to hand the sibling to.
pub fn prunable_nodes(tree: &TimeTree) -> Vec<NodeId> {
    let root = tree.root();
    (0..tree.node_count())
        .filter(|&id| matches!(tree.parent(id), Some(p) if p != root))
        .collect()
}

/// Edges `(c, parent(c))` of the attached tree whose age interval strictly
/// contains `age`, identified by their lower node `c`.
///
/// Only nodes reachable from the root are scanned, so a subtree detached by
/// [`TimeTree::prune`] is excluded automatically.
pub fn spanning_edges(tree: &TimeTree, age: f64) -> Vec<NodeId> {
    tree.iter_preorder()
        .filter(|&c| match tree.parent(c) {
            Some(p) => tree.age(c) < age && age < tree.age(p),
            None => false,
        })
        .collect()
}
