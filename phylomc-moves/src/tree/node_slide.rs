//! Uniform redraw of one internal node age.

use phylomc_core::{random, PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use rand::RngCore;

use super::{non_root_internal, tree_mut};
use crate::proposal::{pick, swap_id, Proposal};

/// Redraw the age of a non-root internal node uniformly between its oldest
/// child and its parent. Neither bound moves, so `ln H = 0`.
#[derive(Debug, Clone)]
pub struct NodeTimeSlideUniformProposal {
    tree: NodeId,
    stored: Option<(phylomc_tree::NodeId, f64)>,
    failed: bool,
}

impl NodeTimeSlideUniformProposal {
    pub fn new(tree: NodeId) -> Self {
        Self {
            tree,
            stored: None,
            failed: false,
        }
    }
}

impl Proposal for NodeTimeSlideUniformProposal {
    fn name(&self) -> &str {
        "NodeTimeSlideUniform"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.tree]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let tree = tree_mut(graph, self.tree)?;
        let node = match pick(&non_root_internal(tree), rng)? {
            Some(node) => node,
            None => {
                self.failed = true;
                return Ok(f64::NEG_INFINITY);
            }
        };
        let parent = tree.parent(node).ok_or_else(|| {
            PhyloMcError::InvalidInput(format!("node {} has no parent", node))
        })?;
        let lower = tree
            .children(node)
            .iter()
            .map(|&c| tree.age(c))
            .fold(f64::NEG_INFINITY, f64::max);
        let upper = tree.age(parent);
        let age = random::uniform(rng, lower, upper);
        if !(lower < age && age < upper) {
            self.failed = true;
            return Ok(f64::NEG_INFINITY);
        }
        self.stored = Some((node, tree.age(node)));
        tree.set_age(node, age)?;
        graph.touch(self.tree)?;
        Ok(0.0)
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some((node, age)) = self.stored {
            tree_mut(graph, self.tree)?.set_age(node, age)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixtures::{caterpillar, tree_graph};
    use crate::tree::tree_ref;
    use phylomc_core::random::seeded_rng;

    #[test]
    fn slides_stay_between_bounds() {
        let original = caterpillar();
        let (mut g, t) = tree_graph(original.clone());
        let mut p = NodeTimeSlideUniformProposal::new(t);
        let mut rng = seeded_rng(61);
        for _ in 0..100 {
            assert_eq!(p.propose(&mut g, &mut rng).unwrap(), 0.0);
            let tree = tree_ref(&g, t).unwrap();
            tree.validate().unwrap();
            assert_eq!(tree.height(), original.height());
            g.keep_touched().unwrap();
            p.clean();
        }
    }

    #[test]
    fn undo_restores_age() {
        let original = caterpillar();
        let (mut g, t) = tree_graph(original.clone());
        let mut p = NodeTimeSlideUniformProposal::new(t);
        let mut rng = seeded_rng(62);
        p.propose(&mut g, &mut rng).unwrap();
        assert_ne!(tree_ref(&g, t).unwrap().ages(), original.ages());
        p.undo(&mut g).unwrap();
        assert_eq!(tree_ref(&g, t).unwrap(), &original);
    }
}
