//! Narrow exchange: swap a node with its uncle.

use phylomc_core::Result;
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_tree::{prunable_nodes, TimeTree};
use rand::RngCore;

use super::tree_mut;
use crate::proposal::{pick, swap_id, Proposal};

/// The uncle of `node`, provided it is younger than `node`'s parent so the
/// exchange keeps every age below its parent's.
pub(crate) fn exchangeable_uncle(
    tree: &TimeTree,
    node: phylomc_tree::NodeId,
) -> Option<phylomc_tree::NodeId> {
    let parent = tree.parent(node)?;
    let uncle = tree.sibling(parent)?;
    (tree.age(uncle) < tree.age(parent)).then_some(uncle)
}

/// Pick a node whose parent is not the root and swap it with its uncle.
/// Symmetric, `ln H = 0`; fails when the uncle is older than the parent.
#[derive(Debug, Clone)]
pub struct NarrowExchangeProposal {
    tree: NodeId,
    exchanged: Option<(phylomc_tree::NodeId, phylomc_tree::NodeId)>,
    failed: bool,
}

impl NarrowExchangeProposal {
    pub fn new(tree: NodeId) -> Self {
        Self {
            tree,
            exchanged: None,
            failed: false,
        }
    }
}

impl Proposal for NarrowExchangeProposal {
    fn name(&self) -> &str {
        "NarrowExchange"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.tree]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let tree = tree_mut(graph, self.tree)?;
        let pair = pick(&prunable_nodes(tree), rng)?
            .and_then(|node| exchangeable_uncle(tree, node).map(|uncle| (node, uncle)));
        let (node, uncle) = match pair {
            Some(pair) => pair,
            None => {
                self.failed = true;
                return Ok(f64::NEG_INFINITY);
            }
        };
        tree.exchange(node, uncle)?;
        self.exchanged = Some((node, uncle));
        graph.touch(self.tree)?;
        Ok(0.0)
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some((node, uncle)) = self.exchanged {
            tree_mut(graph, self.tree)?.exchange(node, uncle)?;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.exchanged = None;
        self.failed = false;
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.tree, old, new);
    }
}
