//! Mapping gene-tree lineages onto species-tree populations.
//!
//! A species-tree node `s` defines a population that lives from `age(s)` up
//! to `age(parent(s))` (unbounded for the root). A gene tree's tips carry the
//! species they were sampled from; the helpers here find which gene nodes
//! coexist with a population by walking up from the population's tips.

use crate::tree::{NodeId, TimeTree};
use phylomc_core::{PhyloMcError, Result};
use std::collections::BTreeSet;

/// The age window and tip species of one species-tree population.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationWindow {
    /// Species names of the species-tree tips below the population.
    pub clade: BTreeSet<String>,
    /// Age of the species node, where the population begins.
    pub min_age: f64,
    /// Age of the species node's parent, None for the root population.
    pub max_age: Option<f64>,
}

impl PopulationWindow {
    /// The population above species node `node`.
    pub fn new(species: &TimeTree, node: NodeId) -> Result<Self> {
        if node >= species.node_count() {
            return Err(PhyloMcError::InvalidInput(format!(
                "species node {} out of range",
                node
            )));
        }
        Ok(Self {
            clade: species_clade(species, node)?,
            min_age: species.age(node),
            max_age: species.parent(node).map(|p| species.age(p)),
        })
    }

    /// True if `age` lies below the population's upper bound.
    pub fn below_max(&self, age: f64) -> bool {
        self.max_age.map_or(true, |max| age < max)
    }
}

/// Species names of the tips below `node` in a species tree.
pub fn species_clade(species: &TimeTree, node: NodeId) -> Result<BTreeSet<String>> {
    species
        .subtree_tips(node)
        .into_iter()
        .map(|t| {
            species
                .species_of(t)
                .map(str::to_owned)
                .ok_or_else(|| PhyloMcError::InvalidInput(format!("species tip {} has no name", t)))
        })
        .collect()
}

/// Gene-tree tips sampled from a species in `clade`.
pub fn gene_tips_in(gene: &TimeTree, clade: &BTreeSet<String>) -> Vec<NodeId> {
    gene.tips()
        .filter(|&t| gene.species_of(t).map_or(false, |s| clade.contains(s)))
        .collect()
}

/// The oldest gene nodes still inside the population: from each tip of the
/// population, walk up while the parent is younger than the population's
/// upper bound. Tips that leave the population immediately are not reported.
///
/// Rescaling these subtrees by the same factor as the species node keeps the
/// gene tree inside the population.
pub fn oldest_nodes_in_population(gene: &TimeTree, window: &PopulationWindow) -> Vec<NodeId> {
    let mut out = BTreeSet::new();
    for tip in gene_tips_in(gene, &window.clade) {
        let mut cur = tip;
        while let Some(p) = gene.parent(cur) {
            if !window.below_max(gene.age(p)) {
                break;
            }
            cur = p;
        }
        if !gene.is_tip(cur) {
            out.insert(cur);
        }
    }
    out.into_iter().collect()
}

/// Every gene node descended from the population's tips whose age lies in
/// `[min_age, max_age)`.
pub fn nodes_in_population(gene: &TimeTree, window: &PopulationWindow) -> Vec<NodeId> {
    let mut pending: BTreeSet<NodeId> = gene_tips_in(gene, &window.clade).into_iter().collect();
    let mut visited = BTreeSet::new();
    let mut out = BTreeSet::new();
    while let Some(id) = pending.pop_first() {
        if !visited.insert(id) {
            continue;
        }
        let age = gene.age(id);
        if age < window.min_age {
            if let Some(p) = gene.parent(id) {
                pending.insert(p);
            }
        } else if window.below_max(age) {
            out.insert(id);
            if let Some(p) = gene.parent(id) {
                pending.insert(p);
            }
        }
    }
    out.into_iter().collect()
}

/// For every gene node, whether all tips below it belong to `clade`.
pub fn lineages_within(gene: &TimeTree, clade: &BTreeSet<String>) -> Vec<bool> {
    let mut within = vec![false; gene.node_count()];
    for id in gene.iter_postorder() {
        within[id] = if gene.is_tip(id) {
            gene.species_of(id).map_or(false, |s| clade.contains(s))
        } else {
            gene.children(id).iter().all(|&c| within[c])
        };
    }
    within
}

/// Gene lineages made only of `clade` tips that are alive at `age`: edges
/// `(c, parent(c))` of the attached tree with `age(c) < age < age(parent(c))`.
pub fn lineages_spanning(gene: &TimeTree, age: f64, clade: &BTreeSet<String>) -> Vec<NodeId> {
    let within = lineages_within(gene, clade);
    crate::candidates::spanning_edges(gene, age)
        .into_iter()
        .filter(|&c| within[c])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const TOL: f64 = 1e-12;

    /// Species tree ((A:1,B:1):2,C:3): AB population spans [1, 3).
    fn species() -> TimeTree {
        TimeTree::from_newick("((A:1,B:1):2,C:3);").unwrap()
    }

    /// Gene tree (((a1:0.5,a2:0.5):1,b1:1.5):2,c1:3.5) with tips mapped to A, A, B, C.
    fn gene() -> TimeTree {
        let mut g = TimeTree::from_newick("(((a1:0.5,a2:0.5):1,b1:1.5):2,c1:3.5);").unwrap();
        let map: BTreeMap<String, String> = [("a1", "A"), ("a2", "A"), ("b1", "B"), ("c1", "C")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        g.assign_species(&map).unwrap();
        g
    }

    fn species_node(sp: &TimeTree, a: &str, b: &str) -> NodeId {
        let x = sp.taxon_index(a).unwrap();
        assert_eq!(sp.sibling(x), sp.taxon_index(b));
        sp.parent(x).unwrap()
    }

    #[test]
    fn window_bounds() {
        let sp = species();
        let ab = species_node(&sp, "A", "B");
        let w = PopulationWindow::new(&sp, ab).unwrap();
        assert!((w.min_age - 1.0).abs() < TOL);
        assert!((w.max_age.unwrap() - 3.0).abs() < TOL);
        assert_eq!(w.clade.len(), 2);
        let root = PopulationWindow::new(&sp, sp.root()).unwrap();
        assert_eq!(root.max_age, None);
    }

    #[test]
    fn oldest_nodes_for_ab_population() {
        let sp = species();
        let g = gene();
        let w = PopulationWindow::new(&sp, species_node(&sp, "A", "B")).unwrap();
        // (a1,a2) at 0.5 and ((a1,a2),b1) at 1.5 sit below 3; the root (3.5) does not
        let oldest = oldest_nodes_in_population(&g, &w);
        let a1 = g.taxon_index("a1").unwrap();
        let aab = g.parent(g.parent(a1).unwrap()).unwrap();
        assert_eq!(oldest, vec![aab]);
    }

    #[test]
    fn oldest_nodes_skip_tips_leaving_immediately() {
        let sp = species();
        let g = gene();
        let a = sp.taxon_index("A").unwrap();
        let w = PopulationWindow::new(&sp, a).unwrap();
        // A population ends at 1: a1 and a2 coalesce at 0.5 inside it
        let oldest = oldest_nodes_in_population(&g, &w);
        let a1 = g.taxon_index("a1").unwrap();
        assert_eq!(oldest, vec![g.parent(a1).unwrap()]);
        let b = sp.taxon_index("B").unwrap();
        let wb = PopulationWindow::new(&sp, b).unwrap();
        assert!(oldest_nodes_in_population(&g, &wb).is_empty());
    }

    #[test]
    fn nodes_in_population_window() {
        let sp = species();
        let g = gene();
        let w = PopulationWindow::new(&sp, species_node(&sp, "A", "B")).unwrap();
        let nodes = nodes_in_population(&g, &w);
        let a1 = g.taxon_index("a1").unwrap();
        let aab = g.parent(g.parent(a1).unwrap()).unwrap();
        // only the coalescence at 1.5 lies in [1, 3)
        assert_eq!(nodes, vec![aab]);
    }

    #[test]
    fn lineages_spanning_by_clade() {
        let sp = species();
        let g = gene();
        let clade_a = species_clade(&sp, sp.taxon_index("A").unwrap()).unwrap();
        let a1 = g.taxon_index("a1").unwrap();
        // at age 1 the (a1,a2) lineage is alive and made of A tips only
        assert_eq!(lineages_spanning(&g, 1.0, &clade_a), vec![g.parent(a1).unwrap()]);
        // at age 0.25 both A tips are separate lineages
        assert_eq!(lineages_spanning(&g, 0.25, &clade_a).len(), 2);
    }
}
