//! Tip-membership bipartitions and Robinson-Foulds distance.
//!
//! A bipartition is one edge of the unrooted tree, seen as the set of tips on
//! one side of it. Taxa are indexed through a [`TaxonOrder`] sorted by name,
//! so two trees with the same taxa but different tip ids or child orders
//! produce comparable bitsets.

use crate::tree::{NodeId, TimeTree};
use phylomc_core::{BitSet, PhyloMcError, Result};
use std::collections::{BTreeSet, HashMap};

/// Taxon name → bit index, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonOrder {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl TaxonOrder {
    /// Build from a list of names; duplicates are rejected.
    pub fn new(mut names: Vec<String>) -> Result<Self> {
        names.sort();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(PhyloMcError::InvalidInput(format!(
                "duplicate taxon '{}'",
                w[0]
            )));
        }
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Ok(Self { names, index })
    }

    /// The order induced by a tree's tip names. Every tip must be named.
    pub fn from_tree(tree: &TimeTree) -> Result<Self> {
        let names = tree.tip_names();
        if names.len() != tree.tip_count() {
            return Err(PhyloMcError::InvalidInput("tree has unnamed tips".into()));
        }
        Self::new(names)
    }

    /// Number of taxa.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no taxa.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Bit index of a taxon.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Taxon names in bit order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A split of the taxa into two sides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bipartition {
    bits: BitSet,
}

impl Bipartition {
    /// Wrap a membership bitset.
    pub fn new(bits: BitSet) -> Self {
        Self { bits }
    }

    /// The membership bitset.
    pub fn bits(&self) -> &BitSet {
        &self.bits
    }

    /// Number of taxa on the set side.
    pub fn size(&self) -> usize {
        self.bits.count_ones()
    }

    /// True if one side holds a single taxon (or none).
    pub fn is_trivial(&self) -> bool {
        let ones = self.size();
        ones <= 1 || ones + 1 >= self.bits.len()
    }

    /// Flip to the side with at most half of the taxa. On an even split the
    /// side without taxon 0 is kept.
    pub fn canonical(&self) -> Self {
        let n = self.bits.len();
        let ones = self.size();
        let flip = 2 * ones > n || (2 * ones == n && self.bits.contains(0));
        if flip {
            Self {
                bits: self.bits.complement(),
            }
        } else {
            self.clone()
        }
    }

    /// Taxon names on the set side.
    pub fn taxa<'a>(&'a self, order: &'a TaxonOrder) -> impl Iterator<Item = &'a str> + 'a {
        self.bits.ones().map(move |i| order.names[i].as_str())
    }
}

/// Membership bitset of the tips below `node`, built by recursive union of
/// the children's sets.
pub fn node_bipartition(tree: &TimeTree, order: &TaxonOrder, node: NodeId) -> Result<Bipartition> {
    if node >= tree.node_count() {
        return Err(PhyloMcError::InvalidInput(format!("node {} out of range", node)));
    }
    Ok(Bipartition::new(clade_bits(tree, order, node)?))
}

fn clade_bits(tree: &TimeTree, order: &TaxonOrder, node: NodeId) -> Result<BitSet> {
    let mut bits = BitSet::new(order.len());
    if tree.is_tip(node) {
        bits.insert(tip_bit(tree, order, node)?)?;
    } else {
        for &c in tree.children(node) {
            bits.union_with(&clade_bits(tree, order, c)?);
        }
    }
    Ok(bits)
}

fn tip_bit(tree: &TimeTree, order: &TaxonOrder, tip: NodeId) -> Result<usize> {
    let name = tree
        .get_node(tip)
        .and_then(|n| n.name.as_deref())
        .ok_or_else(|| PhyloMcError::InvalidInput(format!("tip {} has no name", tip)))?;
    order
        .index_of(name)
        .ok_or_else(|| PhyloMcError::InvalidInput(format!("taxon '{}' not in order", name)))
}

/// Canonical non-trivial bipartitions of every edge of `tree`.
///
/// The two edges below the root describe the same split and collapse into
/// one entry.
pub fn bipartitions(tree: &TimeTree, order: &TaxonOrder) -> Result<BTreeSet<Bipartition>> {
    let mut below: Vec<Option<BitSet>> = vec![None; tree.node_count()];
    let mut out = BTreeSet::new();
    for id in tree.iter_postorder() {
        let mut bits = BitSet::new(order.len());
        if tree.is_tip(id) {
            bits.insert(tip_bit(tree, order, id)?)?;
        } else {
            for &c in tree.children(id) {
                if let Some(child_bits) = below[c].take() {
                    bits.union_with(&child_bits);
                }
            }
        }
        if !tree.is_root(id) {
            let split = Bipartition::new(bits.clone()).canonical();
            if !split.is_trivial() {
                out.insert(split);
            }
        }
        below[id] = Some(bits);
    }
    Ok(out)
}

/// Robinson-Foulds distance: the number of canonical bipartitions present in
/// exactly one of the two trees. Both trees must have the same taxa.
pub fn robinson_foulds(t1: &TimeTree, t2: &TimeTree) -> Result<usize> {
    let order = TaxonOrder::from_tree(t1)?;
    let other = TaxonOrder::from_tree(t2)?;
    if order != other {
        return Err(PhyloMcError::InvalidInput(format!(
            "trees have different taxa: {:?} vs {:?}",
            order.names(),
            other.names()
        )));
    }
    let b1 = bipartitions(t1, &order)?;
    let b2 = bipartitions(t2, &order)?;
    Ok(b1.symmetric_difference(&b2).count())
}
