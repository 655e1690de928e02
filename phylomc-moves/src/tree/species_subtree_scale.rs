//! Species-tree subtree rescale that carries the coupled gene trees along.

use phylomc_core::{PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_tree::population::oldest_nodes_in_population;
use phylomc_tree::PopulationWindow;
use rand::RngCore;

use super::subtree_scale::draw_subtree_factor;
use super::{non_root_internal, tree_mut, tree_ref};
use crate::proposal::{pick, swap_id, Proposal};

/// Rescale a species subtree and, in every gene tree, the oldest subtrees
/// still inside the rescaled population.
///
/// The gene lineages are located against the species tree before it moves.
/// With `k` internal nodes rescaled across all trees,
/// `ln H = (k - 1) ln factor`.
#[derive(Debug, Clone)]
pub struct SpeciesSubtreeScaleProposal {
    species: NodeId,
    genes: Vec<NodeId>,
    stored: Vec<(NodeId, Vec<f64>)>,
    failed: bool,
}

impl SpeciesSubtreeScaleProposal {
    pub fn new(species: NodeId, genes: Vec<NodeId>) -> Result<Self> {
        if genes.contains(&species) {
            return Err(PhyloMcError::Config(format!(
                "node {} is both the species tree and a gene tree",
                species
            )));
        }
        Ok(Self {
            species,
            genes,
            stored: Vec::new(),
            failed: false,
        })
    }

    fn revert(&mut self, graph: &mut ModelGraph) -> Result<()> {
        for (id, ages) in self.stored.drain(..).rev() {
            tree_mut(graph, id)?.set_ages(&ages)?;
        }
        Ok(())
    }

    fn fail(&mut self, graph: &mut ModelGraph) -> Result<f64> {
        self.revert(graph)?;
        self.failed = true;
        Ok(f64::NEG_INFINITY)
    }
}

impl Proposal for SpeciesSubtreeScaleProposal {
    fn name(&self) -> &str {
        "SpeciesSubtreeScale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        std::iter::once(self.species).chain(self.genes.iter().copied()).collect()
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let (node, factor, window) = {
            let species = tree_ref(graph, self.species)?;
            let node = match pick(&non_root_internal(species), rng)? {
                Some(node) => node,
                None => return self.fail(graph),
            };
            let factor = match draw_subtree_factor(species, node, rng)? {
                Some(factor) => factor,
                None => return self.fail(graph),
            };
            (node, factor, PopulationWindow::new(species, node)?)
        };

        let species = tree_mut(graph, self.species)?;
        let mut rescaled = species.internal_nodes_in_subtree(node);
        let old = species.ages();
        species.rescale_subtree(node, factor);
        let valid = species.validate();
        self.stored.push((self.species, old));
        if let Err(e) = valid {
            tracing::warn!(node, factor, error = %e, "species subtree scale broke age order");
            return self.fail(graph);
        }

        let mut touched = vec![self.species];
        for i in 0..self.genes.len() {
            let id = self.genes[i];
            let gene = tree_mut(graph, id)?;
            let heads = oldest_nodes_in_population(gene, &window);
            if heads.is_empty() {
                continue;
            }
            let old = gene.ages();
            for &head in &heads {
                rescaled += gene.internal_nodes_in_subtree(head);
                gene.rescale_subtree(head, factor);
            }
            let valid = gene.validate();
            self.stored.push((id, old));
            if let Err(e) = valid {
                tracing::warn!(gene = %id, factor, error = %e, "coupled gene rescale broke age order");
                return self.fail(graph);
            }
            touched.push(id);
        }

        for id in touched {
            graph.touch(id)?;
        }
        tracing::debug!(node, factor, rescaled, "species subtree scaled");
        Ok((rescaled as f64 - 1.0) * factor.ln())
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        self.revert(graph)
    }

    fn clean(&mut self) {
        self.stored.clear();
        self.failed = false;
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.species, old, new);
        for id in &mut self.genes {
            swap_id(id, old, new);
        }
    }
}
