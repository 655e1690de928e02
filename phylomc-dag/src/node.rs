//! Graph nodes.

use crate::distribution::Distribution;
use crate::function::Function;
use crate::value::{Value, ValueCell};
use std::collections::BTreeSet;
use std::fmt;

/// Stable handle to a node in a [`ModelGraph`](crate::ModelGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The three node variants.
#[derive(Debug)]
pub enum NodeKind {
    /// Fixed value, never dirtied.
    Constant,
    /// Value drawn from a distribution of the parents.
    Stochastic {
        distribution: Box<dyn Distribution>,
        /// Observed data: excluded from proposals, counted as likelihood.
        clamped: bool,
        /// Cached `ln p(value | parents)`, stale while the node is dirty.
        ln_probability: f64,
        /// The value `ln_probability` had when the node was first touched in
        /// the current cycle.
        stored_ln_probability: f64,
    },
    /// Value computed from the parents.
    Deterministic { function: Box<dyn Function> },
}

/// One quantity of the model.
///
/// Parent and child links are node ids into the owning graph. If A lists B
/// as a parent, B lists A as a child.
#[derive(Debug)]
pub struct DagNode {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) value: ValueCell<Value>,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: BTreeSet<NodeId>,
    pub(crate) dirty: bool,
    pub(crate) touched: bool,
}

impl DagNode {
    pub(crate) fn new(name: String, kind: NodeKind, value: Value, parents: Vec<NodeId>) -> Self {
        Self {
            name,
            kind,
            value: ValueCell::new(value),
            parents,
            children: BTreeSet::new(),
            dirty: false,
            touched: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The current value as last computed. For a dirty deterministic node
    /// this is stale; read through [`ModelGraph::value`](crate::ModelGraph::value).
    pub fn current_value(&self) -> &Value {
        self.value.current()
    }

    /// The last committed value.
    pub fn stored_value(&self) -> &Value {
        self.value.stored()
    }

    /// Parents in parameter order.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant)
    }

    pub fn is_stochastic(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { .. })
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.kind, NodeKind::Deterministic { .. })
    }

    /// True for a clamped stochastic node.
    pub fn is_clamped(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { clamped: true, .. })
    }

    /// Variant name for log records.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Constant => "constant",
            NodeKind::Stochastic { .. } => "stochastic",
            NodeKind::Deterministic { .. } => "deterministic",
        }
    }

    /// The stochastic node's cached log-probability, if clean.
    pub fn cached_ln_probability(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Stochastic { ln_probability, .. } if !self.dirty => Some(ln_probability),
            _ => None,
        }
    }

    /// Mark touched and dirty. Returns true on the first touch of the cycle.
    pub(crate) fn mark_touched(&mut self) -> bool {
        let first = !self.touched;
        if first {
            self.touched = true;
            if let NodeKind::Stochastic {
                ln_probability,
                stored_ln_probability,
                ..
            } = &mut self.kind
            {
                *stored_ln_probability = *ln_probability;
            }
        }
        self.dirty = true;
        first
    }

    /// Commit the (already recomputed) current state.
    pub(crate) fn commit(&mut self) {
        self.value.keep();
        if let NodeKind::Stochastic {
            ln_probability,
            stored_ln_probability,
            ..
        } = &mut self.kind
        {
            *stored_ln_probability = *ln_probability;
        }
        self.touched = false;
        self.dirty = false;
    }

    /// Roll back to the committed state.
    pub(crate) fn roll_back(&mut self) {
        self.value.restore();
        if let NodeKind::Stochastic {
            ln_probability,
            stored_ln_probability,
            ..
        } = &mut self.kind
        {
            *ln_probability = *stored_ln_probability;
        }
        self.touched = false;
        self.dirty = false;
    }
}
