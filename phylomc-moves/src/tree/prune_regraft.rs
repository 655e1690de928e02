//! Prune-and-regraft with the pruned node's parent keeping its age.
//!
//! Pruning node `x` detaches its parent `p` (with `x` below it) and splices
//! the sibling onto the grandparent. Because `p` keeps its age, the legal
//! reattachment points are exactly the edges of the remaining tree whose age
//! interval contains `age(p)`. The old sibling's edge is always one of them.

use phylomc_core::prob::{ln_sum_exp, sample_ln_weights};
use phylomc_core::{random, PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_tree::{prunable_nodes, spanning_edges, PruneRecord, TimeTree};
use rand::RngCore;

use super::{tree_mut, tree_ref};
use crate::proposal::{pick, swap_id, Proposal};

/// Put a regrafted node back where [`TimeTree::prune`] found it.
pub(crate) fn undo_regraft(tree: &mut TimeTree, record: &PruneRecord) -> Result<()> {
    tree.prune(record.node)?;
    tree.undo_prune(record)
}

/// Pick a prunable node and an alternative edge uniformly.
///
/// The candidate set is the same before and after the move, so
/// `ln H = ln |forward| - ln |backward| = 0`.
#[derive(Debug, Clone)]
pub struct FixedNodeheightPruneRegraftProposal {
    tree: NodeId,
    record: Option<PruneRecord>,
    failed: bool,
}

impl FixedNodeheightPruneRegraftProposal {
    pub fn new(tree: NodeId) -> Self {
        Self {
            tree,
            record: None,
            failed: false,
        }
    }

    fn fail(&mut self) -> Result<f64> {
        self.failed = true;
        Ok(f64::NEG_INFINITY)
    }
}

impl Proposal for FixedNodeheightPruneRegraftProposal {
    fn name(&self) -> &str {
        "FixedNodeheightPruneRegraft"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.tree]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let tree = tree_mut(graph, self.tree)?;
        let node = match pick(&prunable_nodes(tree), rng)? {
            Some(node) => node,
            None => return self.fail(),
        };
        let record = tree.prune(node)?;
        let edges = spanning_edges(tree, tree.age(record.parent));
        let forward: Vec<_> = edges.iter().copied().filter(|&c| c != record.sibling).collect();
        let target = match pick(&forward, rng)? {
            Some(target) => target,
            None => {
                tree.undo_prune(&record)?;
                return self.fail();
            }
        };
        let backward = edges.iter().filter(|&&c| c != target).count();
        tree.regraft(record.parent, target)?;
        self.record = Some(record);
        graph.touch(self.tree)?;
        Ok((forward.len() as f64).ln() - (backward as f64).ln())
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some(record) = &self.record {
            undo_regraft(tree_mut(graph, self.tree)?, record)?;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.record = None;
        self.failed = false;
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.tree, old, new);
    }
}

/// Regraft onto an alternative edge drawn in proportion to the posterior.
///
/// Every edge spanning the pruned parent's age, the current one included, is
/// weighted by grafting there, touching the tree and reading the summed log
/// probability of everything touched. The new edge is then drawn among the
/// alternatives to the current one, which gives
///
/// `ln H = ln w_old - ln Σ_{S∖new} w + ln Σ_{S∖old} w - ln w_new`.
#[derive(Debug, Clone)]
pub struct GibbsPruneRegraftProposal {
    tree: NodeId,
    record: Option<PruneRecord>,
    failed: bool,
}

impl GibbsPruneRegraftProposal {
    pub fn new(tree: NodeId) -> Self {
        Self {
            tree,
            record: None,
            failed: false,
        }
    }

    fn fail(&mut self) -> Result<f64> {
        self.failed = true;
        Ok(f64::NEG_INFINITY)
    }

    /// Prune `node` (a tree node id) and regraft it by weighted choice.
    ///
    /// Fails with `InvalidInput` if `node` is the root or a child of the root.
    pub fn propose_for(
        &mut self,
        graph: &mut ModelGraph,
        node: phylomc_tree::NodeId,
        rng: &mut dyn RngCore,
    ) -> Result<f64> {
        let record = tree_mut(graph, self.tree)?.prune(node)?;
        let edges = {
            let tree = tree_ref(graph, self.tree)?;
            spanning_edges(tree, tree.age(record.parent))
        };
        if edges.len() < 2 {
            tree_mut(graph, self.tree)?.undo_prune(&record)?;
            return self.fail();
        }
        let current = edges
            .iter()
            .position(|&c| c == record.sibling)
            .ok_or_else(|| {
                PhyloMcError::Numerical(format!(
                    "sibling {} no longer spans the age of its pruned parent",
                    record.sibling
                ))
            })?;

        let mut ln_weights = Vec::with_capacity(edges.len());
        for &candidate in &edges {
            tree_mut(graph, self.tree)?.regraft(record.parent, candidate)?;
            graph.touch(self.tree)?;
            let ln_weight = graph.touched_ln_probability()?;
            tracing::trace!(pruned = node, candidate, ln_weight, "regraft weight");
            ln_weights.push(ln_weight);
            tree_mut(graph, self.tree)?.prune(node)?;
        }

        let excluding = |skip: usize| -> Vec<f64> {
            let mut w = ln_weights.clone();
            w[skip] = f64::NEG_INFINITY;
            w
        };
        let forward = excluding(current);
        let chosen = match sample_ln_weights(&forward, random::uniform01(rng)) {
            Some(i) => i,
            None => {
                tree_mut(graph, self.tree)?.undo_prune(&record)?;
                return self.fail();
            }
        };

        let ln_hastings = ln_weights[current] - ln_sum_exp(&excluding(chosen))
            + ln_sum_exp(&forward)
            - ln_weights[chosen];
        tree_mut(graph, self.tree)?.regraft(record.parent, edges[chosen])?;
        self.record = Some(record);
        graph.touch(self.tree)?;
        Ok(ln_hastings)
    }
}

impl Proposal for GibbsPruneRegraftProposal {
    fn name(&self) -> &str {
        "GibbsPruneRegraft"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.tree]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let prunable = prunable_nodes(tree_ref(graph, self.tree)?);
        match pick(&prunable, rng)? {
            Some(node) => self.propose_for(graph, node, rng),
            None => self.fail(),
        }
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some(record) = &self.record {
            undo_regraft(tree_mut(graph, self.tree)?, record)?;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.record = None;
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
    use crate::tree::fixtures::{balanced, caterpillar, tree_graph};
    use phylomc_core::random::seeded_rng;
    use phylomc_tree::robinson_foulds;

    const TOL: f64 = 1e-12;

    fn current(g: &ModelGraph, t: NodeId) -> TimeTree {
        tree_ref(g, t).unwrap().clone()
    }

    #[test]
    fn fnpr_keeps_tree_valid_and_undoes() {
        let original = balanced();
        let (mut g, t) = tree_graph(original.clone());
        let mut p = FixedNodeheightPruneRegraftProposal::new(t);
        let mut rng = seeded_rng(41);
        for _ in 0..50 {
            let ln_h = p.propose(&mut g, &mut rng).unwrap();
            if p.failed() {
                assert_eq!(ln_h, f64::NEG_INFINITY);
            } else {
                assert!(ln_h.abs() < TOL);
                let moved = current(&g, t);
                moved.validate().unwrap();
                assert_eq!(moved.tip_names(), original.tip_names());
                assert_eq!(moved.ages(), original.ages());
                p.undo(&mut g).unwrap();
            }
            g.restore_touched().unwrap();
            p.clean();
            assert_eq!(current(&g, t), original);
        }
    }

    #[test]
    fn fnpr_without_alternative_fails() {
        // C is sampled at 2.5, so nothing but B spans age 1
        let tree = TimeTree::from_newick("((A:1,B:1):2,C:0.5);").unwrap();
        let (mut g, t) = tree_graph(tree.clone());
        let mut p = FixedNodeheightPruneRegraftProposal::new(t);
        let mut rng = seeded_rng(42);
        assert_eq!(p.propose(&mut g, &mut rng).unwrap(), f64::NEG_INFINITY);
        assert!(p.failed());
        assert!(g.touched_nodes().is_empty());
        assert_eq!(current(&g, t), tree);
    }

    #[test]
    fn gibbs_single_alternative_is_certain() {
        let tree = caterpillar();
        let (mut g, t) = tree_graph(tree.clone());
        let a = tree.taxon_index("A").unwrap();
        let ab = tree.parent(a).unwrap();
        let mut p = GibbsPruneRegraftProposal::new(t);
        let mut rng = seeded_rng(43);
        let ln_h = p.propose_for(&mut g, ab, &mut rng).unwrap();
        assert!(ln_h.abs() < TOL);
        let moved = current(&g, t);
        let d = moved.taxon_index("D").unwrap();
        assert_eq!(moved.sibling(ab), Some(d));
        let c = moved.taxon_index("C").unwrap();
        assert_eq!(moved.parent(c), Some(moved.root()));
        // the unrooted splits of a 4-taxon caterpillar survive the move
        assert_eq!(robinson_foulds(&tree, &moved).unwrap(), 0);
    }

    #[test]
    fn gibbs_equal_weights_give_zero_hastings() {
        let (mut g, t) = tree_graph(balanced());
        let mut p = GibbsPruneRegraftProposal::new(t);
        let mut rng = seeded_rng(44);
        for _ in 0..20 {
            let ln_h = p.propose(&mut g, &mut rng).unwrap();
            assert!(!p.failed());
            assert!(ln_h.abs() < 1e-9);
            current(&g, t).validate().unwrap();
            g.keep_touched().unwrap();
            p.clean();
        }
    }

    #[test]
    fn gibbs_rejects_child_of_root() {
        let tree = balanced();
        let (mut g, t) = tree_graph(tree.clone());
        let mut p = GibbsPruneRegraftProposal::new(t);
        let mut rng = seeded_rng(45);
        let child = tree.children(tree.root())[0];
        assert!(matches!(
            p.propose_for(&mut g, child, &mut rng),
            Err(PhyloMcError::InvalidInput(_))
        ));
    }
}
