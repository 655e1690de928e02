//! The deterministic-function capability consumed by deterministic nodes.

use crate::node::NodeId;
use crate::value::Value;
use phylomc_core::Result;
use std::fmt;

/// A pure function of the owning node's parent values (in parent order).
pub trait Function: fmt::Debug {
    /// Short name used in summaries and log records.
    fn name(&self) -> &str;

    /// Recompute the value from the parents' current values.
    fn update(&self, params: &[&Value]) -> Result<Value>;

    /// Called after the owning node's parent `old` was replaced by `new`.
    fn swap_parameter(&mut self, _old: NodeId, _new: NodeId) {}
}
