//! Time-calibrated rooted trees.
//!
//! Uses arena-style storage: nodes live in a flat `Vec<TreeNode>` and are
//! referenced by `NodeId` (a `usize` index). Tips occupy ids `0..n_tips` and
//! internal nodes follow; ids are stable across every edit, so an undo only
//! has to remember which indices moved.
//!
//! Each node carries an age (time before present). Branch lengths are derived
//! as `age(parent) - age(node)` and never stored.

use phylomc_core::{PhyloMcError, Result, Summarizable};
use std::collections::BTreeMap;

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A single node in a time tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeNode {
    /// Index of this node in the arena.
    pub id: NodeId,
    /// Parent node (None for the root and for a detached pruned node).
    pub parent: Option<NodeId>,
    /// Child nodes, ordered.
    pub children: Vec<NodeId>,
    /// Age before present.
    pub age: f64,
    /// Taxon or clade label.
    pub name: Option<String>,
    /// Species a gene-tree tip was sampled from. Falls back to `name`.
    pub species: Option<String>,
}

impl TreeNode {
    /// A node with no edges.
    pub fn new(id: NodeId, age: f64, name: Option<String>) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            age,
            name,
            species: None,
        }
    }

    /// True if this node has no children.
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }
}

/// What [`TimeTree::prune`] changed, enough to put it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneRecord {
    /// The node whose parent was detached; it stays attached to that parent.
    pub node: NodeId,
    /// The detached parent.
    pub parent: NodeId,
    /// The parent's former parent, which now holds the sibling.
    pub grandparent: NodeId,
    /// The former sibling of `node`.
    pub sibling: NodeId,
    /// Position of `parent` in the grandparent's child list.
    pub parent_slot: usize,
    /// Position of `sibling` in the parent's child list.
    pub sibling_slot: usize,
}

/// A rooted, bifurcating tree with node ages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
    n_tips: usize,
}

impl TimeTree {
    /// Build a tree from pre-built nodes and a root index.
    ///
    /// Node ids are reassigned so that tips come first (in preorder) followed
    /// by internal nodes, children before parents. Parent links are rebuilt from the
    /// child lists. The result is validated.
    pub fn from_parts(nodes: Vec<TreeNode>, root: NodeId) -> Result<Self> {
        if nodes.is_empty() {
            return Err(PhyloMcError::InvalidInput("empty node list".into()));
        }
        if root >= nodes.len() {
            return Err(PhyloMcError::InvalidInput(format!(
                "root index {} out of range ({})",
                root,
                nodes.len()
            )));
        }
        for node in &nodes {
            if let Some(&bad) = node.children.iter().find(|&&c| c >= nodes.len()) {
                return Err(PhyloMcError::InvalidInput(format!(
                    "child index {} out of range ({})",
                    bad,
                    nodes.len()
                )));
            }
        }

        // Preorder from the root, refusing to visit a node twice.
        let mut seen = vec![false; nodes.len()];
        let mut preorder = Vec::with_capacity(nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if seen[id] {
                return Err(PhyloMcError::InvalidInput(format!(
                    "node {} reached twice; not a tree",
                    id
                )));
            }
            seen[id] = true;
            preorder.push(id);
            for &child in nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        if preorder.len() != nodes.len() {
            return Err(PhyloMcError::InvalidInput(format!(
                "{} nodes unreachable from root",
                nodes.len() - preorder.len()
            )));
        }

        let mut order: Vec<NodeId> = preorder
            .iter()
            .copied()
            .filter(|&id| nodes[id].is_tip())
            .collect();
        let n_tips = order.len();
        order.extend(preorder.iter().rev().copied().filter(|&id| !nodes[id].is_tip()));

        let mut new_id = vec![0; nodes.len()];
        for (new, &old) in order.iter().enumerate() {
            new_id[old] = new;
        }
        let mut arena: Vec<TreeNode> = order
            .iter()
            .map(|&old| {
                let src = &nodes[old];
                TreeNode {
                    id: new_id[old],
                    parent: None,
                    children: src.children.iter().map(|&c| new_id[c]).collect(),
                    age: src.age,
                    name: src.name.clone(),
                    species: src.species.clone(),
                }
            })
            .collect();
        for id in 0..arena.len() {
            for c in arena[id].children.clone() {
                arena[c].parent = Some(id);
            }
        }

        let tree = Self {
            nodes: arena,
            root: new_id[root],
            n_tips,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Parse a Newick string; ages are derived from branch lengths.
    pub fn from_newick(input: &str) -> Result<Self> {
        crate::newick::parse(input)
    }

    /// Serialize to Newick with branch lengths.
    pub fn to_newick(&self) -> String {
        crate::newick::write(self)
    }

    /// Access a node by id.
    pub fn get_node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of tips.
    pub fn tip_count(&self) -> usize {
        self.n_tips
    }

    /// Parent of `id`. Panics if `id` is out of range.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Children of `id`. Panics if `id` is out of range.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Age of `id`. Panics if `id` is out of range.
    pub fn age(&self, id: NodeId) -> f64 {
        self.nodes[id].age
    }

    /// The other child of `id`'s parent.
    pub fn sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(id)?.parent?;
        self.nodes[parent].children.iter().copied().find(|&c| c != id)
    }

    /// Derived branch length `age(parent) - age(id)`, None for the root.
    pub fn branch_length(&self, id: NodeId) -> Option<f64> {
        let parent = self.nodes.get(id)?.parent?;
        Some(self.nodes[parent].age - self.nodes[id].age)
    }

    /// True if `id` is a tip.
    pub fn is_tip(&self, id: NodeId) -> bool {
        id < self.n_tips
    }

    /// True if `id` is the root.
    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Tip ids, `0..n_tips`.
    pub fn tips(&self) -> std::ops::Range<NodeId> {
        0..self.n_tips
    }

    /// Internal node ids, root included.
    pub fn internal_nodes(&self) -> std::ops::Range<NodeId> {
        self.n_tips..self.nodes.len()
    }

    /// Age of the root.
    pub fn height(&self) -> f64 {
        self.nodes[self.root].age
    }

    /// True if `ancestor` is `node` or lies on the path from `node` to the root.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.nodes[id].parent;
        }
        false
    }

    /// Every node in the subtree rooted at `id`, in preorder.
    pub fn subtree_nodes(&self, id: NodeId) -> Vec<NodeId> {
        PreorderIter {
            tree: self,
            stack: vec![id],
        }
        .collect()
    }

    /// Tip ids below `id` (itself if it is a tip).
    pub fn subtree_tips(&self, id: NodeId) -> Vec<NodeId> {
        self.subtree_nodes(id)
            .into_iter()
            .filter(|&n| self.is_tip(n))
            .collect()
    }

    /// Age of the oldest tip below `id`; the lower bound for `id`'s own age.
    pub fn oldest_tip_age(&self, id: NodeId) -> f64 {
        self.subtree_tips(id)
            .into_iter()
            .map(|t| self.nodes[t].age)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Number of internal nodes in the subtree rooted at `id`, `id` included.
    pub fn internal_nodes_in_subtree(&self, id: NodeId) -> usize {
        self.subtree_nodes(id)
            .into_iter()
            .filter(|&n| !self.is_tip(n))
            .count()
    }

    /// Species label of a tip: its `species`, else its `name`.
    pub fn species_of(&self, id: NodeId) -> Option<&str> {
        let node = self.nodes.get(id)?;
        node.species.as_deref().or(node.name.as_deref())
    }

    /// Tips sampled from `species`.
    pub fn tips_with_species(&self, species: &str) -> Vec<NodeId> {
        self.tips()
            .filter(|&t| self.species_of(t) == Some(species))
            .collect()
    }

    /// The tip carrying `name`.
    pub fn taxon_index(&self, name: &str) -> Option<NodeId> {
        self.tips()
            .find(|&t| self.nodes[t].name.as_deref() == Some(name))
    }

    /// Sorted tip names (unnamed tips are skipped).
    pub fn tip_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tips()
            .filter_map(|t| self.nodes[t].name.clone())
            .collect();
        names.sort();
        names
    }

    /// Set the species of one tip.
    pub fn set_species(&mut self, tip: NodeId, species: impl Into<String>) -> Result<()> {
        if !self.is_tip(tip) {
            return Err(PhyloMcError::InvalidInput(format!(
                "node {} is not a tip",
                tip
            )));
        }
        self.nodes[tip].species = Some(species.into());
        Ok(())
    }

    /// Assign species to every tip from a tip-name → species map.
    ///
    /// Fails if a tip is unnamed or missing from the map.
    pub fn assign_species(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        for t in 0..self.n_tips {
            let name = self.nodes[t].name.as_deref().ok_or_else(|| {
                PhyloMcError::InvalidInput(format!("tip {} has no name", t))
            })?;
            let species = map.get(name).ok_or_else(|| {
                PhyloMcError::InvalidInput(format!("no species for tip '{}'", name))
            })?;
            self.nodes[t].species = Some(species.clone());
        }
        Ok(())
    }

    /// Pre-order (parent before children) traversal yielding node ids.
    pub fn iter_preorder(&self) -> PreorderIter<'_> {
        PreorderIter {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Post-order (children before parent) traversal yielding node ids.
    pub fn iter_postorder(&self) -> PostorderIter {
        let mut sequence = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            sequence.push(id);
            for &child in &self.nodes[id].children {
                stack.push(child);
            }
        }
        sequence.reverse();
        PostorderIter { sequence, pos: 0 }
    }

    // ---- ages ----

    /// Ages of all nodes in id order.
    pub fn ages(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.age).collect()
    }

    /// Overwrite all ages. Does not validate ordering.
    pub fn set_ages(&mut self, ages: &[f64]) -> Result<()> {
        if ages.len() != self.nodes.len() {
            return Err(PhyloMcError::InvalidInput(format!(
                "expected {} ages, got {}",
                self.nodes.len(),
                ages.len()
            )));
        }
        for (node, &age) in self.nodes.iter_mut().zip(ages) {
            node.age = age;
        }
        Ok(())
    }

    /// Overwrite one age. Does not validate ordering.
    pub fn set_age(&mut self, id: NodeId, age: f64) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or_else(|| {
            PhyloMcError::InvalidInput(format!("node {} out of range", id))
        })?;
        node.age = age;
        Ok(())
    }

    /// Multiply the age of every internal node in the subtree of `id` by
    /// `factor`. Tips keep their sampling times.
    pub fn rescale_subtree(&mut self, id: NodeId, factor: f64) {
        for n in self.subtree_nodes(id) {
            if !self.is_tip(n) {
                self.nodes[n].age *= factor;
            }
        }
    }

    // ---- topology edits ----

    /// Detach the parent of `node` (with `node` still hanging below it) and
    /// splice `node`'s sibling onto the grandparent.
    ///
    /// The detached parent keeps its age and has `node` as its only child
    /// until [`regraft`](Self::regraft) or [`undo_prune`](Self::undo_prune).
    pub fn prune(&mut self, node: NodeId) -> Result<PruneRecord> {
        let parent = self.parent_checked(node)?;
        let grandparent = self.nodes[parent].parent.ok_or_else(|| {
            PhyloMcError::InvalidInput(format!(
                "cannot prune node {}: its parent is the root",
                node
            ))
        })?;
        let sibling_slot = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c != node)
            .ok_or_else(|| {
                PhyloMcError::InvalidInput(format!("node {} has no sibling", node))
            })?;
        let sibling = self.nodes[parent].children[sibling_slot];
        let parent_slot = self.slot_of(grandparent, parent)?;

        self.nodes[grandparent].children[parent_slot] = sibling;
        self.nodes[sibling].parent = Some(grandparent);
        self.nodes[parent].children.remove(sibling_slot);
        self.nodes[parent].parent = None;

        Ok(PruneRecord {
            node,
            parent,
            grandparent,
            sibling,
            parent_slot,
            sibling_slot,
        })
    }

    /// Insert the detached node `parent` on the edge above `new_sibling`.
    ///
    /// Requires `age(new_sibling) < age(parent) < age(parent(new_sibling))`.
    pub fn regraft(&mut self, parent: NodeId, new_sibling: NodeId) -> Result<()> {
        let slot = self.nodes[parent].children.len();
        self.regraft_at(parent, new_sibling, slot)
    }

    /// Reverse a [`prune`](Self::prune): put the detached parent back above
    /// its old sibling, at the same child positions.
    pub fn undo_prune(&mut self, record: &PruneRecord) -> Result<()> {
        self.regraft_at(record.parent, record.sibling, record.sibling_slot)?;
        debug_assert_eq!(
            self.nodes[record.grandparent].children[record.parent_slot],
            record.parent
        );
        Ok(())
    }

    fn regraft_at(&mut self, parent: NodeId, new_sibling: NodeId, slot: usize) -> Result<()> {
        if parent >= self.nodes.len() || new_sibling >= self.nodes.len() {
            return Err(PhyloMcError::InvalidInput("node id out of range".into()));
        }
        if self.nodes[parent].parent.is_some() || parent == self.root {
            return Err(PhyloMcError::InvalidInput(format!(
                "node {} is not detached",
                parent
            )));
        }
        if self.nodes[parent].children.len() != 1 {
            return Err(PhyloMcError::InvalidInput(format!(
                "detached node {} must have exactly one child",
                parent
            )));
        }
        let attach = self.parent_checked(new_sibling)?;
        let age = self.nodes[parent].age;
        if !(self.nodes[new_sibling].age < age && age < self.nodes[attach].age) {
            return Err(PhyloMcError::Numerical(format!(
                "cannot regraft node {} (age {}) above node {}: edge spans ({}, {})",
                parent, age, new_sibling, self.nodes[new_sibling].age, self.nodes[attach].age
            )));
        }
        let attach_slot = self.slot_of(attach, new_sibling)?;
        self.nodes[attach].children[attach_slot] = parent;
        self.nodes[parent].parent = Some(attach);
        let slot = slot.min(self.nodes[parent].children.len());
        self.nodes[parent].children.insert(slot, new_sibling);
        self.nodes[new_sibling].parent = Some(parent);
        Ok(())
    }

    /// Swap the parents of `a` and `b`, keeping child positions.
    ///
    /// Neither node may be an ancestor of the other.
    pub fn exchange(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        let pa = self.parent_checked(a)?;
        let pb = self.parent_checked(b)?;
        if pa == pb {
            return Err(PhyloMcError::InvalidInput(format!(
                "nodes {} and {} are siblings",
                a, b
            )));
        }
        if self.is_ancestor(a, b) || self.is_ancestor(b, a) {
            return Err(PhyloMcError::InvalidInput(format!(
                "nodes {} and {} are on one lineage",
                a, b
            )));
        }
        let sa = self.slot_of(pa, a)?;
        let sb = self.slot_of(pb, b)?;
        self.nodes[pa].children[sa] = b;
        self.nodes[pb].children[sb] = a;
        self.nodes[a].parent = Some(pb);
        self.nodes[b].parent = Some(pa);
        Ok(())
    }

    fn parent_checked(&self, id: NodeId) -> Result<NodeId> {
        self.nodes
            .get(id)
            .ok_or_else(|| PhyloMcError::InvalidInput(format!("node {} out of range", id)))?
            .parent
            .ok_or_else(|| PhyloMcError::InvalidInput(format!("node {} has no parent", id)))
    }

    fn slot_of(&self, parent: NodeId, child: NodeId) -> Result<usize> {
        self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                PhyloMcError::InvalidInput(format!(
                    "node {} is not a child of {}",
                    child, parent
                ))
            })
    }

    // ---- invariants ----

    /// Check the structural and temporal invariants: exactly one root, every
    /// node reachable from it, symmetric parent/child links, tips first,
    /// bifurcating internal nodes, and `age(node) < age(parent)`.
    pub fn validate(&self) -> Result<()> {
        if self.nodes[self.root].parent.is_some() {
            return Err(PhyloMcError::InvalidInput(format!(
                "root {} has a parent",
                self.root
            )));
        }
        let mut reached = 0usize;
        for id in self.iter_preorder() {
            reached += 1;
            if reached > self.nodes.len() {
                return Err(PhyloMcError::InvalidInput("cycle in tree".into()));
            }
            let node = &self.nodes[id];
            if node.id != id {
                return Err(PhyloMcError::InvalidInput(format!(
                    "node at slot {} claims id {}",
                    id, node.id
                )));
            }
            if node.is_tip() != (id < self.n_tips) {
                return Err(PhyloMcError::InvalidInput(format!(
                    "node {} is out of the tips-first order",
                    id
                )));
            }
            if !node.is_tip() && node.children.len() != 2 {
                return Err(PhyloMcError::InvalidInput(format!(
                    "node {} has {} children",
                    id,
                    node.children.len()
                )));
            }
            if !node.age.is_finite() {
                return Err(PhyloMcError::Numerical(format!("node {} has age {}", id, node.age)));
            }
            for &c in &node.children {
                if self.nodes[c].parent != Some(id) {
                    return Err(PhyloMcError::InvalidInput(format!(
                        "child {} does not point back to {}",
                        c, id
                    )));
                }
                if !(self.nodes[c].age < node.age) {
                    return Err(PhyloMcError::Numerical(format!(
                        "node {} (age {}) is not younger than its parent {} (age {})",
                        c, self.nodes[c].age, id, node.age
                    )));
                }
            }
        }
        if reached != self.nodes.len() {
            return Err(PhyloMcError::InvalidInput(format!(
                "{} nodes unreachable from root",
                self.nodes.len() - reached
            )));
        }
        Ok(())
    }
}

impl Summarizable for TimeTree {
    fn summary(&self) -> String {
        format!(
            "TimeTree: {} nodes ({} tips, {} internal), height {:.4}",
            self.node_count(),
            self.n_tips,
            self.node_count() - self.n_tips,
            self.height()
        )
    }
}

/// Pre-order iterator over node ids.
pub struct PreorderIter<'a> {
    tree: &'a TimeTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        // Push children in reverse order so leftmost is visited first.
        for &child in self.tree.nodes[id].children.iter().rev() {
            self.stack.push(child);
        }
        Some(id)
    }
}

/// Post-order iterator over node ids.
pub struct PostorderIter {
    sequence: Vec<NodeId>,
    pos: usize,
}

impl Iterator for PostorderIter {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = *self.sequence.get(self.pos)?;
        self.pos += 1;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    /// ((((A,B)1,C)2,D)3): tips at age 0, internal ages 1, 2, 3.
    fn caterpillar() -> TimeTree {
        TimeTree::from_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap()
    }

    fn id(tree: &TimeTree, name: &str) -> NodeId {
        tree.taxon_index(name).unwrap()
    }

    #[test]
    fn tips_come_first() {
        let tree = caterpillar();
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.tip_count(), 4);
        for t in tree.tips() {
            assert!(tree.get_node(t).unwrap().is_tip());
        }
        for n in tree.internal_nodes() {
            assert!(!tree.get_node(n).unwrap().is_tip());
        }
        assert_eq!(tree.tip_names(), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn ages_from_branch_lengths() {
        let tree = caterpillar();
        let a = id(&tree, "A");
        let ab = tree.parent(a).unwrap();
        assert!((tree.age(a)).abs() < TOL);
        assert!((tree.age(ab) - 1.0).abs() < TOL);
        assert!((tree.height() - 3.0).abs() < TOL);
        assert!((tree.branch_length(ab).unwrap() - 1.0).abs() < TOL);
        assert_eq!(tree.branch_length(tree.root()), None);
    }

    #[test]
    fn sibling_and_subtree_queries() {
        let tree = caterpillar();
        let a = id(&tree, "A");
        let b = id(&tree, "B");
        assert_eq!(tree.sibling(a), Some(b));
        assert_eq!(tree.sibling(tree.root()), None);
        let ab = tree.parent(a).unwrap();
        let abc = tree.parent(ab).unwrap();
        let mut tips = tree.subtree_tips(abc);
        tips.sort();
        let mut expected = vec![a, b, id(&tree, "C")];
        expected.sort();
        assert_eq!(tips, expected);
        assert_eq!(tree.internal_nodes_in_subtree(abc), 2);
        assert_eq!(tree.internal_nodes_in_subtree(a), 0);
        assert!(tree.is_ancestor(abc, a));
        assert!(!tree.is_ancestor(a, abc));
    }

    #[test]
    fn oldest_tip_age_non_ultrametric() {
        let tree = TimeTree::from_newick("((A:1,B:0.5):1,C:2);").unwrap();
        let b = id(&tree, "B");
        let ab = tree.parent(b).unwrap();
        assert!((tree.oldest_tip_age(ab) - 0.5).abs() < TOL);
        assert!((tree.oldest_tip_age(tree.root()) - 0.5).abs() < TOL);
    }

    #[test]
    fn prune_and_undo_restores_exactly() {
        let mut tree = caterpillar();
        let before = tree.clone();
        let a = id(&tree, "A");
        let record = tree.prune(a).unwrap();
        assert_eq!(record.sibling, id(&tree, "B"));
        assert_eq!(tree.parent(record.parent), None);
        assert_eq!(tree.children(record.parent), &[a]);
        assert_eq!(tree.parent(record.sibling), Some(record.grandparent));
        tree.undo_prune(&record).unwrap();
        assert_eq!(tree, before);
    }

    #[test]
    fn prune_rejects_root_children() {
        let mut tree = caterpillar();
        let d = id(&tree, "D");
        assert!(tree.prune(d).is_err());
        assert!(tree.prune(tree.root()).is_err());
    }

    #[test]
    fn regraft_moves_subtree() {
        let mut tree = caterpillar();
        let a = id(&tree, "A");
        let d = id(&tree, "D");
        // age of AB is 1: D's edge spans (0, 3)
        let record = tree.prune(a).unwrap();
        tree.regraft(record.parent, d).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.sibling(a), Some(d));
        assert_eq!(tree.parent(record.parent), Some(tree.root()));
    }

    #[test]
    fn regraft_checks_ages() {
        let mut tree = caterpillar();
        let a = id(&tree, "A");
        let record = tree.prune(a).unwrap();
        // the C-B parent (age 2) edge does not straddle age 1 from above
        let cb = tree.parent(id(&tree, "C")).unwrap();
        assert!(tree.regraft(record.parent, cb).is_err());
    }

    #[test]
    fn exchange_swaps_parents() {
        let mut tree = TimeTree::from_newick("((A:1,B:1):2,(C:2,D:2):1);").unwrap();
        let a = id(&tree, "A");
        let c = id(&tree, "C");
        let pa = tree.parent(a).unwrap();
        let pc = tree.parent(c).unwrap();
        tree.exchange(a, c).unwrap();
        assert_eq!(tree.parent(a), Some(pc));
        assert_eq!(tree.parent(c), Some(pa));
        tree.validate().unwrap();
        tree.exchange(a, c).unwrap();
        assert_eq!(tree.parent(a), Some(pa));
    }

    #[test]
    fn exchange_rejects_lineage() {
        let mut tree = caterpillar();
        let a = id(&tree, "A");
        let ab = tree.parent(a).unwrap();
        assert!(tree.exchange(a, ab).is_err());
        assert!(tree.exchange(a, id(&tree, "B")).is_err());
    }

    #[test]
    fn rescale_keeps_tips() {
        let mut tree = caterpillar();
        let a = id(&tree, "A");
        let abc = tree.parent(tree.parent(a).unwrap()).unwrap();
        tree.rescale_subtree(abc, 1.25);
        assert!((tree.age(abc) - 2.5).abs() < TOL);
        assert!((tree.age(tree.parent(a).unwrap()) - 1.25).abs() < TOL);
        assert_eq!(tree.age(a), 0.0);
        tree.validate().unwrap();
    }

    #[test]
    fn validate_catches_age_violation() {
        let mut tree = caterpillar();
        let ab = tree.parent(id(&tree, "A")).unwrap();
        tree.set_age(ab, 2.5).unwrap();
        assert!(matches!(tree.validate(), Err(PhyloMcError::Numerical(_))));
    }

    #[test]
    fn set_ages_length_mismatch() {
        let mut tree = caterpillar();
        assert!(tree.set_ages(&[0.0; 3]).is_err());
        let ages = tree.ages();
        tree.set_ages(&ages).unwrap();
    }

    #[test]
    fn from_parts_rejects_shared_child() {
        let mut nodes: Vec<TreeNode> = (0..3)
            .map(|i| TreeNode::new(i, if i == 2 { 1.0 } else { 0.0 }, Some(format!("t{i}"))))
            .collect();
        nodes[2].children = vec![0, 0];
        assert!(TimeTree::from_parts(nodes, 2).is_err());
    }

    #[test]
    fn from_parts_renumbers() {
        let mut nodes = vec![
            TreeNode::new(0, 1.0, None),
            TreeNode::new(1, 0.0, Some("A".into())),
            TreeNode::new(2, 0.0, Some("B".into())),
        ];
        nodes[0].children = vec![1, 2];
        let tree = TimeTree::from_parts(nodes, 0).unwrap();
        assert_eq!(tree.root(), 2);
        assert_eq!(tree.taxon_index("A"), Some(0));
        assert_eq!(tree.taxon_index("B"), Some(1));
    }

    #[test]
    fn species_assignment() {
        let mut tree = TimeTree::from_newick("((a1:1,a2:1):1,b1:2);").unwrap();
        let mut map = BTreeMap::new();
        map.insert("a1".to_string(), "A".to_string());
        map.insert("a2".to_string(), "A".to_string());
        assert!(tree.assign_species(&map).is_err());
        map.insert("b1".to_string(), "B".to_string());
        tree.assign_species(&map).unwrap();
        assert_eq!(tree.tips_with_species("A").len(), 2);
        assert_eq!(tree.tips_with_species("B").len(), 1);
    }

    #[test]
    fn traversals_cover_all_nodes() {
        let tree = caterpillar();
        let pre: Vec<NodeId> = tree.iter_preorder().collect();
        let post: Vec<NodeId> = tree.iter_postorder().collect();
        assert_eq!(pre.len(), 7);
        assert_eq!(pre[0], tree.root());
        assert_eq!(*post.last().unwrap(), tree.root());
    }

    #[test]
    fn summary_format() {
        let tree = caterpillar();
        assert_eq!(
            tree.summary(),
            "TimeTree: 7 nodes (4 tips, 3 internal), height 3.0000"
        );
    }
}
