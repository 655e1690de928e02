//! Rescaling of a whole subtree.

use phylomc_core::{random, PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_tree::TimeTree;
use rand::RngCore;

use super::{non_root_internal, tree_mut};
use crate::proposal::{pick, swap_id, Proposal};

/// A new age for `node`, uniform between its oldest tip and its parent, and
/// the factor it implies. None when the window is empty.
pub(crate) fn draw_subtree_factor(
    tree: &TimeTree,
    node: phylomc_tree::NodeId,
    rng: &mut dyn RngCore,
) -> Result<Option<f64>> {
    let parent = tree
        .parent(node)
        .ok_or_else(|| PhyloMcError::InvalidInput(format!("node {} has no parent", node)))?;
    let lower = tree.oldest_tip_age(node);
    let upper = tree.age(parent);
    let age = random::uniform(rng, lower, upper);
    if !(lower < age && age < upper) || !(tree.age(node) > 0.0) {
        return Ok(None);
    }
    Ok(Some(age / tree.age(node)))
}

/// Multiply every internal age below a non-root internal node by the factor
/// that moves the node to a uniform age under its parent.
///
/// `ln H = (k - 1) ln factor` for the `k` internal nodes rescaled.
#[derive(Debug, Clone)]
pub struct SubtreeScaleProposal {
    tree: NodeId,
    stored: Option<Vec<f64>>,
    failed: bool,
}

impl SubtreeScaleProposal {
    pub fn new(tree: NodeId) -> Self {
        Self {
            tree,
            stored: None,
            failed: false,
        }
    }

    fn fail(&mut self) -> Result<f64> {
        self.failed = true;
        Ok(f64::NEG_INFINITY)
    }
}

impl Proposal for SubtreeScaleProposal {
    fn name(&self) -> &str {
        "SubtreeScale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.tree]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let tree = tree_mut(graph, self.tree)?;
        let node = match pick(&non_root_internal(tree), rng)? {
            Some(node) => node,
            None => return self.fail(),
        };
        let factor = match draw_subtree_factor(tree, node, rng)? {
            Some(factor) => factor,
            None => return self.fail(),
        };
        let old = tree.ages();
        tree.rescale_subtree(node, factor);
        if let Err(e) = tree.validate() {
            tracing::warn!(node, factor, error = %e, "subtree scale broke age order");
            tree.set_ages(&old)?;
            return self.fail();
        }
        let k = tree.internal_nodes_in_subtree(node);
        self.stored = Some(old);
        graph.touch(self.tree)?;
        Ok((k as f64 - 1.0) * factor.ln())
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some(ages) = &self.stored {
            tree_mut(graph, self.tree)?.set_ages(ages)?;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.stored = None;
        self.failed = false;
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.tree, old, new);
    }
}
