//! Species-tree narrow exchange that keeps the gene trees compatible.
//!
//! Exchanging species node `N` with its uncle `U` turns the parent
//! population `P = (N, B)` into `(U, B)`. Any gene coalescence inside `P`
//! that joins an `N` lineage with a `B` lineage would then be impossible, so
//! the `B`-side lineage is pruned (its parent keeps its age) and regrafted
//! onto a `U` lineage alive at that age. The reverse move regrafts it back
//! onto an `N` lineage, which gives
//! `ln H = Σ ln |N lineages| - Σ ln |U lineages|` over every regraft.

use std::collections::BTreeSet;

use phylomc_core::{PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_tree::population::{lineages_spanning, lineages_within, species_clade};
use phylomc_tree::{prunable_nodes, PruneRecord, TimeTree};
use rand::RngCore;

use super::narrow_exchange::exchangeable_uncle;
use super::prune_regraft::undo_regraft;
use super::{tree_mut, tree_ref};
use crate::proposal::{pick, swap_id, Proposal};

/// What the gene trees need to know about one species exchange, read before
/// anything moves.
#[derive(Debug, Clone)]
struct ExchangePlan {
    node: phylomc_tree::NodeId,
    uncle: phylomc_tree::NodeId,
    /// Upper bound of the parent population (the grandparent's age).
    max_age: f64,
    node_clade: BTreeSet<String>,
    brother_clade: BTreeSet<String>,
    uncle_clade: BTreeSet<String>,
}

impl ExchangePlan {
    fn draw(species: &TimeTree, rng: &mut dyn RngCore) -> Result<Option<Self>> {
        let node = match pick(&prunable_nodes(species), rng)? {
            Some(node) => node,
            None => return Ok(None),
        };
        let uncle = match exchangeable_uncle(species, node) {
            Some(uncle) => uncle,
            None => return Ok(None),
        };
        let missing = |what: &str| {
            PhyloMcError::InvalidInput(format!("species node {} has no {}", node, what))
        };
        let parent = species.parent(node).ok_or_else(|| missing("parent"))?;
        let grandparent = species.parent(parent).ok_or_else(|| missing("grandparent"))?;
        let brother = species.sibling(node).ok_or_else(|| missing("sibling"))?;
        Ok(Some(Self {
            node,
            uncle,
            max_age: species.age(grandparent),
            node_clade: species_clade(species, node)?,
            brother_clade: species_clade(species, brother)?,
            uncle_clade: species_clade(species, uncle)?,
        }))
    }

    /// A gene node below the grandparent joining an `N` lineage with a `B`
    /// lineage, returned as its `B`-side child.
    fn conflict(&self, gene: &TimeTree) -> Option<phylomc_tree::NodeId> {
        let in_node = lineages_within(gene, &self.node_clade);
        let in_brother = lineages_within(gene, &self.brother_clade);
        gene.internal_nodes()
            .filter(|&p| gene.age(p) < self.max_age)
            .find_map(|p| match *gene.children(p) {
                [x, y] if in_node[x] && in_brother[y] => Some(y),
                [x, y] if in_brother[x] && in_node[y] => Some(x),
                _ => None,
            })
    }

    /// Move the lineage `b` onto a uncle-population lineage. Returns the
    /// prune record and the log Hastings term, or None (tree untouched) when
    /// no uncle lineage spans the coalescence.
    fn regraft(
        &self,
        gene: &mut TimeTree,
        b: phylomc_tree::NodeId,
        rng: &mut dyn RngCore,
    ) -> Result<Option<(PruneRecord, f64)>> {
        match gene.parent(b).and_then(|p| gene.parent(p)) {
            Some(_) => {}
            None => return Ok(None),
        }
        let record = gene.prune(b)?;
        let age = gene.age(record.parent);
        let forward = lineages_spanning(gene, age, &self.uncle_clade);
        let backward = lineages_spanning(gene, age, &self.node_clade).len();
        match pick(&forward, rng)? {
            Some(target) => {
                gene.regraft(record.parent, target)?;
                let ln_h = (backward as f64).ln() - (forward.len() as f64).ln();
                Ok(Some((record, ln_h)))
            }
            None => {
                gene.undo_prune(&record)?;
                Ok(None)
            }
        }
    }
}

/// Narrow exchange on a species tree with the coupled gene-tree regrafts.
#[derive(Debug, Clone)]
pub struct SpeciesNarrowExchangeProposal {
    species: NodeId,
    genes: Vec<NodeId>,
    exchanged: Option<(phylomc_tree::NodeId, phylomc_tree::NodeId)>,
    regrafts: Vec<(NodeId, PruneRecord)>,
    failed: bool,
}

impl SpeciesNarrowExchangeProposal {
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
            exchanged: None,
            regrafts: Vec::new(),
            failed: false,
        })
    }

    fn revert(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some((node, uncle)) = self.exchanged.take() {
            tree_mut(graph, self.species)?.exchange(node, uncle)?;
        }
        for (gene, record) in self.regrafts.drain(..).rev() {
            undo_regraft(tree_mut(graph, gene)?, &record)?;
        }
        Ok(())
    }

    fn fail(&mut self, graph: &mut ModelGraph) -> Result<f64> {
        self.revert(graph)?;
        self.failed = true;
        Ok(f64::NEG_INFINITY)
    }
}

impl Proposal for SpeciesNarrowExchangeProposal {
    fn name(&self) -> &str {
        "SpeciesNarrowExchange"
    }

    fn nodes(&self) -> Vec<NodeId> {
        std::iter::once(self.species).chain(self.genes.iter().copied()).collect()
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let plan = match ExchangePlan::draw(tree_ref(graph, self.species)?, rng)? {
            Some(plan) => plan,
            None => return self.fail(graph),
        };

        let mut ln_hastings = 0.0;
        let mut touched = vec![self.species];
        for i in 0..self.genes.len() {
            let id = self.genes[i];
            let gene = tree_mut(graph, id)?;
            let before = self.regrafts.len();
            // each regraft resolves one conflicting coalescence
            for _ in 0..gene.node_count() {
                let b = match plan.conflict(gene) {
                    Some(b) => b,
                    None => break,
                };
                match plan.regraft(gene, b, rng)? {
                    Some((record, ln_h)) => {
                        self.regrafts.push((id, record));
                        ln_hastings += ln_h;
                    }
                    None => {
                        tracing::debug!(gene = %id, lineage = b, "no uncle lineage to regraft onto");
                        return self.fail(graph);
                    }
                }
            }
            if plan.conflict(tree_ref(graph, id)?).is_some() {
                tracing::warn!(gene = %id, "gene tree conflicts left after regrafting");
                return self.fail(graph);
            }
            if self.regrafts.len() > before {
                touched.push(id);
            }
        }

        tree_mut(graph, self.species)?.exchange(plan.node, plan.uncle)?;
        self.exchanged = Some((plan.node, plan.uncle));
        for id in touched {
            graph.touch(id)?;
        }
        Ok(ln_hastings)
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        self.revert(graph)
    }

    fn clean(&mut self) {
        self.exchanged = None;
        self.regrafts.clear();
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
