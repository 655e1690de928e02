//! Proposals on time trees.
//!
//! Every move here edits a [`TimeTree`] held by a stochastic graph node in
//! place and records only what it changed: a [`PruneRecord`], an exchanged
//! pair, or the old ages. Infeasible draws are reported through the failure
//! flag, never as errors.
//!
//! [`PruneRecord`]: phylomc_tree::PruneRecord

pub mod narrow_exchange;
pub mod node_slide;
pub mod prune_regraft;
pub mod species_narrow_exchange;
pub mod species_subtree_scale;
pub mod subtree_scale;

pub use narrow_exchange::NarrowExchangeProposal;
pub use node_slide::NodeTimeSlideUniformProposal;
pub use prune_regraft::{FixedNodeheightPruneRegraftProposal, GibbsPruneRegraftProposal};
pub use species_narrow_exchange::SpeciesNarrowExchangeProposal;
pub use species_subtree_scale::SpeciesSubtreeScaleProposal;
pub use subtree_scale::SubtreeScaleProposal;

use phylomc_core::Result;
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_tree::TimeTree;

pub(crate) fn tree_mut(graph: &mut ModelGraph, node: NodeId) -> Result<&mut TimeTree> {
    graph.value_mut(node)?.as_tree_mut()
}

pub(crate) fn tree_ref(graph: &ModelGraph, node: NodeId) -> Result<&TimeTree> {
    graph.node(node)?.current_value().as_tree()
}

/// Internal nodes other than the root.
pub(crate) fn non_root_internal(tree: &TimeTree) -> Vec<phylomc_tree::NodeId> {
    tree.internal_nodes().filter(|&n| !tree.is_root(n)).collect()
}
