//! The model graph: an arena of nodes with lazy evaluation.
//!
//! Nodes are stored in `Vec<Option<DagNode>>` slots addressed by [`NodeId`];
//! parent and child links are ids, so there are no ownership cycles. A node
//! can only be added once its parents exist, which keeps construction acyclic;
//! [`ModelGraph::swap_parent`] is the one edit that could close a cycle and it
//! checks for one.
//!
//! # Touch, keep, restore
//!
//! A proposal writes a stochastic node's current value and calls
//! [`touch`](ModelGraph::touch). The touch marks the node and, transitively,
//! every dependent deterministic node dirty, stopping at stochastic children
//! whose value did not change but whose log-probability is now stale. Nothing
//! is recomputed until read. [`keep`](ModelGraph::keep) recomputes what is
//! still dirty and commits; [`restore`](ModelGraph::restore) copies the
//! committed values back without recomputing anything.

use std::collections::BTreeSet;

use phylomc_core::{PhyloMcError, Result, Summarizable};
use rand::RngCore;

use crate::distribution::Distribution;
use crate::function::Function;
use crate::node::{DagNode, NodeId, NodeKind};
use crate::value::Value;

/// The outcome of re-evaluating one node.
enum Evaluation {
    Constant,
    LnProbability(f64),
    Value(Value),
}

/// A directed acyclic graph of model quantities.
#[derive(Debug, Default)]
pub struct ModelGraph {
    nodes: Vec<Option<DagNode>>,
    roots: BTreeSet<NodeId>,
    /// Nodes touched since the last keep or restore, in first-touch order.
    touched: Vec<NodeId>,
}

fn checked_ln_probability(
    distribution: &dyn Distribution,
    node_name: &str,
    value: &Value,
    params: &[&Value],
) -> Result<f64> {
    let ln_p = distribution.ln_probability(value, params)?;
    if ln_p.is_nan() {
        return Err(PhyloMcError::Numerical(format!(
            "{} returned NaN for node '{}'",
            distribution.name(),
            node_name
        )));
    }
    Ok(ln_p)
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- construction ----

    /// Add a node holding a fixed value.
    pub fn add_constant(&mut self, name: impl Into<String>, value: impl Into<Value>) -> NodeId {
        self.insert(DagNode::new(
            name.into(),
            NodeKind::Constant,
            value.into(),
            Vec::new(),
        ))
    }

    /// Add a stochastic node with an initial value.
    ///
    /// The value is scored immediately, so a parameter of the wrong kind is
    /// reported here rather than during sampling.
    pub fn add_stochastic(
        &mut self,
        name: impl Into<String>,
        distribution: impl Distribution + 'static,
        parents: &[NodeId],
        value: impl Into<Value>,
    ) -> Result<NodeId> {
        let name = name.into();
        let value = value.into();
        self.refresh_each(parents)?;
        let ln_p = {
            let params = self.param_values(parents)?;
            checked_ln_probability(&distribution, &name, &value, &params)?
        };
        Ok(self.insert(DagNode::new(
            name,
            NodeKind::Stochastic {
                distribution: Box::new(distribution),
                clamped: false,
                ln_probability: ln_p,
                stored_ln_probability: ln_p,
            },
            value,
            parents.to_vec(),
        )))
    }

    /// Add a stochastic node whose initial value is drawn from its
    /// distribution.
    pub fn add_stochastic_drawn(
        &mut self,
        name: impl Into<String>,
        distribution: impl Distribution + 'static,
        parents: &[NodeId],
        rng: &mut dyn RngCore,
    ) -> Result<NodeId> {
        self.refresh_each(parents)?;
        let value = {
            let params = self.param_values(parents)?;
            distribution.redraw(&params, rng)?
        };
        self.add_stochastic(name, distribution, parents, value)
    }

    /// Add a node computed from its parents.
    pub fn add_deterministic(
        &mut self,
        name: impl Into<String>,
        function: impl Function + 'static,
        parents: &[NodeId],
    ) -> Result<NodeId> {
        self.refresh_each(parents)?;
        let value = {
            let params = self.param_values(parents)?;
            function.update(&params)?
        };
        Ok(self.insert(DagNode::new(
            name.into(),
            NodeKind::Deterministic {
                function: Box::new(function),
            },
            value,
            parents.to_vec(),
        )))
    }

    fn insert(&mut self, node: DagNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        for &p in &node.parents {
            if let Some(Some(parent)) = self.nodes.get_mut(p.0) {
                parent.children.insert(id);
            }
        }
        tracing::trace!(node = %id, name = %node.name, kind = node.kind_name(), "add node");
        self.nodes.push(Some(node));
        id
    }

    // ---- lookup ----

    pub fn node(&self, id: NodeId) -> Result<&DagNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| PhyloMcError::InvalidInput(format!("no node {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut DagNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| PhyloMcError::InvalidInput(format!("no node {}", id)))
    }

    /// The first live node called `name`.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    fn iter(&self) -> impl Iterator<Item = (NodeId, &DagNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (NodeId(i), n)))
    }

    /// Every live node.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Every live stochastic node, clamped or not.
    pub fn stochastic_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.is_stochastic())
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep `id` and its ancestors alive across [`collect_garbage`](Self::collect_garbage).
    pub fn track(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.roots.insert(id);
        Ok(())
    }

    /// Stop tracking `id`. Returns false if it was not a root.
    pub fn untrack(&mut self, id: NodeId) -> bool {
        self.roots.remove(&id)
    }

    pub fn roots(&self) -> &BTreeSet<NodeId> {
        &self.roots
    }

    /// Nodes touched since the last keep or restore.
    pub fn touched_nodes(&self) -> &[NodeId] {
        &self.touched
    }

    // ---- evaluation ----

    fn param_values(&self, parents: &[NodeId]) -> Result<Vec<&Value>> {
        parents
            .iter()
            .map(|&p| self.node(p).map(DagNode::current_value))
            .collect()
    }

    fn evaluate(&self, id: NodeId) -> Result<Evaluation> {
        let node = self.node(id)?;
        let params = self.param_values(&node.parents)?;
        Ok(match &node.kind {
            NodeKind::Constant => Evaluation::Constant,
            NodeKind::Stochastic { distribution, .. } => Evaluation::LnProbability(
                checked_ln_probability(
                    distribution.as_ref(),
                    &node.name,
                    node.value.current(),
                    &params,
                )?,
            ),
            NodeKind::Deterministic { function } => Evaluation::Value(function.update(&params)?),
        })
    }

    /// Recompute `id` if dirty, after its dirty ancestors.
    fn refresh(&mut self, id: NodeId) -> Result<()> {
        let parents = {
            let node = self.node(id)?;
            if !node.dirty {
                return Ok(());
            }
            node.parents.clone()
        };
        self.refresh_each(&parents)?;
        let evaluation = self.evaluate(id)?;
        let node = self.node_mut(id)?;
        match evaluation {
            Evaluation::Constant => {}
            Evaluation::LnProbability(ln_p) => {
                if let NodeKind::Stochastic { ln_probability, .. } = &mut node.kind {
                    *ln_probability = ln_p;
                }
            }
            Evaluation::Value(value) => node.value.set(value),
        }
        node.dirty = false;
        Ok(())
    }

    fn refresh_each(&mut self, ids: &[NodeId]) -> Result<()> {
        for &id in ids {
            self.refresh(id)?;
        }
        Ok(())
    }

    /// The node's current value, recomputing a dirty deterministic node.
    pub fn value(&mut self, id: NodeId) -> Result<&Value> {
        if self.node(id)?.is_deterministic() {
            self.refresh(id)?;
        }
        Ok(self.node(id)?.current_value())
    }

    fn expect_stochastic(&self, id: NodeId) -> Result<&DagNode> {
        let node = self.node(id)?;
        if !node.is_stochastic() {
            return Err(PhyloMcError::Config(format!(
                "node '{}' is {}, not stochastic",
                node.name,
                node.kind_name()
            )));
        }
        Ok(node)
    }

    /// `ln p(value | parents)` of a stochastic node, recomputed if stale.
    pub fn ln_probability(&mut self, id: NodeId) -> Result<f64> {
        self.expect_stochastic(id)?;
        self.refresh(id)?;
        match self.node(id)?.kind {
            NodeKind::Stochastic { ln_probability, .. } => Ok(ln_probability),
            _ => Err(PhyloMcError::Config(format!("node {} is not stochastic", id))),
        }
    }

    /// The log-probability the node had before its first touch this cycle.
    pub fn stored_ln_probability(&self, id: NodeId) -> Result<f64> {
        match self.expect_stochastic(id)?.kind {
            NodeKind::Stochastic {
                stored_ln_probability,
                ..
            } => Ok(stored_ln_probability),
            _ => Err(PhyloMcError::Config(format!("node {} is not stochastic", id))),
        }
    }

    /// New minus stored log-probability; zero when both are equal, including
    /// both infinite.
    pub fn ln_probability_ratio(&mut self, id: NodeId) -> Result<f64> {
        let new = self.ln_probability(id)?;
        let old = self.stored_ln_probability(id)?;
        Ok(if new == old { 0.0 } else { new - old })
    }

    // ---- touch / keep / restore ----

    /// Mark `id` and everything downstream of it stale.
    ///
    /// The node's own children are always visited. A dirty child is skipped;
    /// a deterministic child passes the touch on; a stochastic child stops it.
    pub fn touch(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.is_constant() {
            return Err(PhyloMcError::Config(format!(
                "constant node '{}' cannot be touched",
                node.name
            )));
        }
        let first = node.mark_touched();
        let mut pending: Vec<NodeId> = node.children.iter().copied().collect();
        if first {
            self.touched.push(id);
        }
        while let Some(c) = pending.pop() {
            let child = self.node_mut(c)?;
            if child.dirty {
                continue;
            }
            let first = child.mark_touched();
            if child.is_deterministic() {
                pending.extend(child.children.iter().copied());
            }
            if first {
                self.touched.push(c);
            }
        }
        Ok(())
    }

    /// Touch every non-constant node.
    pub fn touch_all(&mut self) {
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if let Some(node) = slot {
                if !node.is_constant() && node.mark_touched() {
                    self.touched.push(NodeId(i));
                }
            }
        }
    }

    /// `id` plus every touched node reachable from it through touched children.
    fn touched_closure(&self, id: NodeId) -> Result<BTreeSet<NodeId>> {
        let mut closure = BTreeSet::new();
        let mut pending = vec![id];
        while let Some(n) = pending.pop() {
            if !closure.insert(n) {
                continue;
            }
            for &c in self.node(n)?.children() {
                if self.node(c)?.touched {
                    pending.push(c);
                }
            }
        }
        Ok(closure)
    }

    /// Accept the edit at `id`: recompute and commit it and its touched
    /// dependents.
    pub fn keep(&mut self, id: NodeId) -> Result<()> {
        let closure = self.touched_closure(id)?;
        for &n in &closure {
            self.refresh(n)?;
        }
        for &n in &closure {
            self.node_mut(n)?.commit();
        }
        self.touched.retain(|n| !closure.contains(n));
        Ok(())
    }

    /// Reject the edit at `id`: roll it and its touched dependents back to
    /// their committed values.
    pub fn restore(&mut self, id: NodeId) -> Result<()> {
        let closure = self.touched_closure(id)?;
        for &n in &closure {
            self.node_mut(n)?.roll_back();
        }
        self.touched.retain(|n| !closure.contains(n));
        Ok(())
    }

    /// Recompute and commit every node touched this cycle.
    pub fn keep_touched(&mut self) -> Result<()> {
        let touched = std::mem::take(&mut self.touched);
        for &n in &touched {
            self.refresh(n)?;
        }
        for &n in &touched {
            self.node_mut(n)?.commit();
        }
        Ok(())
    }

    /// Roll back every node touched this cycle.
    pub fn restore_touched(&mut self) -> Result<()> {
        for n in std::mem::take(&mut self.touched) {
            self.node_mut(n)?.roll_back();
        }
        Ok(())
    }

    /// Recompute and commit every node.
    pub fn keep_all(&mut self) -> Result<()> {
        for id in self.node_ids() {
            self.refresh(id)?;
        }
        for node in self.nodes.iter_mut().flatten() {
            if !node.is_constant() {
                node.commit();
            }
        }
        self.touched.clear();
        Ok(())
    }

    /// Roll every node back to its committed value.
    pub fn restore_all(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            if !node.is_constant() {
                node.roll_back();
            }
        }
        self.touched.clear();
    }

    // ---- aggregates ----

    fn sum_ln_probability(&mut self, ids: Vec<NodeId>) -> Result<f64> {
        let mut total = 0.0;
        for id in ids {
            total += self.ln_probability(id)?;
        }
        Ok(total)
    }

    /// Sum over every stochastic node.
    pub fn ln_posterior(&mut self) -> Result<f64> {
        let ids = self.stochastic_nodes();
        self.sum_ln_probability(ids)
    }

    /// Sum over clamped (observed) stochastic nodes.
    pub fn ln_likelihood(&mut self) -> Result<f64> {
        let ids = self
            .iter()
            .filter(|(_, n)| n.is_clamped())
            .map(|(id, _)| id)
            .collect();
        self.sum_ln_probability(ids)
    }

    /// Sum over free stochastic nodes.
    pub fn ln_prior(&mut self) -> Result<f64> {
        let ids = self
            .iter()
            .filter(|(_, n)| n.is_stochastic() && !n.is_clamped())
            .map(|(id, _)| id)
            .collect();
        self.sum_ln_probability(ids)
    }

    /// Sum over the stochastic nodes touched this cycle.
    pub fn touched_ln_probability(&mut self) -> Result<f64> {
        let ids = self
            .touched
            .iter()
            .copied()
            .filter(|&id| self.node(id).map_or(false, DagNode::is_stochastic))
            .collect();
        self.sum_ln_probability(ids)
    }

    // ---- values ----

    fn expect_free(&self, id: NodeId) -> Result<&DagNode> {
        let node = self.expect_stochastic(id)?;
        if node.is_clamped() {
            return Err(PhyloMcError::Config(format!(
                "node '{}' is clamped to observed data",
                node.name
            )));
        }
        Ok(node)
    }

    /// Fix a stochastic node to observed data and commit.
    pub fn clamp(&mut self, id: NodeId, value: impl Into<Value>) -> Result<()> {
        if !self.touched.is_empty() {
            return Err(PhyloMcError::Protocol(
                "cannot clamp while a proposal is in flight".into(),
            ));
        }
        let value = value.into();
        let node = self.expect_stochastic(id)?;
        if !node.current_value().same_kind(&value) {
            return Err(PhyloMcError::TypeMismatch {
                expected: node.current_value().kind(),
                found: value.kind(),
            });
        }
        let node = self.node_mut(id)?;
        node.value.set(value);
        if let NodeKind::Stochastic { clamped, .. } = &mut node.kind {
            *clamped = true;
        }
        self.touch(id)?;
        self.keep_touched()
    }

    /// Release a clamped node back to the free parameters.
    pub fn unclamp(&mut self, id: NodeId) -> Result<()> {
        self.expect_stochastic(id)?;
        if let NodeKind::Stochastic { clamped, .. } = &mut self.node_mut(id)?.kind {
            *clamped = false;
        }
        Ok(())
    }

    /// Replace a free stochastic node's current value and touch it.
    pub fn set_value(&mut self, id: NodeId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let node = self.expect_free(id)?;
        if !node.current_value().same_kind(&value) {
            return Err(PhyloMcError::TypeMismatch {
                expected: node.current_value().kind(),
                found: value.kind(),
            });
        }
        self.node_mut(id)?.value.set(value);
        self.touch(id)
    }

    /// In-place access to a free stochastic node's current value. The caller
    /// touches the node afterwards.
    pub fn value_mut(&mut self, id: NodeId) -> Result<&mut Value> {
        self.expect_free(id)?;
        Ok(self.node_mut(id)?.value.current_mut())
    }

    /// Draw a new value for a free stochastic node and touch it.
    pub fn redraw(&mut self, id: NodeId, rng: &mut dyn RngCore) -> Result<()> {
        let parents = self.expect_free(id)?.parents.clone();
        self.refresh_each(&parents)?;
        let value = {
            let node = self.node(id)?;
            let params = self.param_values(&parents)?;
            match &node.kind {
                NodeKind::Stochastic { distribution, .. } => distribution.redraw(&params, rng)?,
                _ => return Err(PhyloMcError::Config(format!("node {} is not stochastic", id))),
            }
        };
        self.node_mut(id)?.value.set(value);
        self.touch(id)
    }

    // ---- structure ----

    fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let mut pending = vec![ancestor];
        let mut seen = BTreeSet::new();
        while let Some(n) = pending.pop() {
            if n == node {
                return Ok(true);
            }
            if seen.insert(n) {
                pending.extend(self.node(n)?.children.iter().copied());
            }
        }
        Ok(false)
    }

    /// Rewire `child` to read `new` wherever it read `old`, then touch it.
    ///
    /// The new parameters are checked before anything changes: a kind the
    /// node's distribution or function cannot read leaves the graph as it was.
    pub fn swap_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let node = self.node(child)?;
        if !node.parents.contains(&old) {
            return Err(PhyloMcError::Config(format!(
                "{} is not a parent of '{}'",
                old, node.name
            )));
        }
        self.node(new)?;
        if self.is_descendant(child, new)? {
            return Err(PhyloMcError::Cycle(format!(
                "making {} a parent of {} would close a cycle",
                new, child
            )));
        }

        let parents: Vec<NodeId> = node
            .parents
            .iter()
            .map(|&p| if p == old { new } else { p })
            .collect();
        self.refresh_each(&parents)?;
        {
            let node = self.node(child)?;
            let params = self.param_values(&parents)?;
            match &node.kind {
                NodeKind::Stochastic { distribution, .. } => {
                    checked_ln_probability(
                        distribution.as_ref(),
                        &node.name,
                        node.value.current(),
                        &params,
                    )?;
                }
                NodeKind::Deterministic { function } => {
                    function.update(&params)?;
                }
                NodeKind::Constant => {}
            }
        }

        let node = self.node_mut(child)?;
        node.parents = parents;
        match &mut node.kind {
            NodeKind::Stochastic { distribution, .. } => distribution.swap_parameter(old, new),
            NodeKind::Deterministic { function } => function.swap_parameter(old, new),
            NodeKind::Constant => {}
        }
        self.node_mut(old)?.children.remove(&child);
        self.node_mut(new)?.children.insert(child);
        tracing::debug!(%child, %old, %new, "swapped parent");
        self.touch(child)
    }

    /// Free every node that no tracked root depends on. Returns the number
    /// of nodes removed; with no roots tracked nothing is removed.
    pub fn collect_garbage(&mut self) -> usize {
        if self.roots.is_empty() {
            return 0;
        }
        let mut live = vec![false; self.nodes.len()];
        let mut pending: Vec<NodeId> = self.roots.iter().copied().collect();
        while let Some(id) = pending.pop() {
            if live[id.0] {
                continue;
            }
            if let Some(Some(node)) = self.nodes.get(id.0) {
                live[id.0] = true;
                pending.extend(node.parents.iter().copied());
            }
        }

        let mut freed = 0;
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if !live[i] && slot.take().is_some() {
                freed += 1;
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            node.children.retain(|c| live[c.0]);
        }
        self.touched.retain(|n| live[n.0]);
        tracing::debug!(freed, remaining = self.len(), "collected unreachable nodes");
        freed
    }
}

impl Summarizable for ModelGraph {
    fn summary(&self) -> String {
        let mut counts = [0usize; 4];
        for (_, node) in self.iter() {
            let slot = match node.kind {
                NodeKind::Constant => 0,
                NodeKind::Deterministic { .. } => 1,
                NodeKind::Stochastic { clamped: false, .. } => 2,
                NodeKind::Stochastic { clamped: true, .. } => 3,
            };
            counts[slot] += 1;
        }
        format!(
            "ModelGraph: {} nodes ({} constant, {} deterministic, {} stochastic, {} clamped)",
            self.len(),
            counts[0],
            counts[1],
            counts[2],
            counts[3]
        )
    }
}
