//! The probability-distribution capability consumed by stochastic nodes.

use crate::node::NodeId;
use crate::value::Value;
use phylomc_core::Result;
use rand::RngCore;
use std::fmt;

/// A distribution over [`Value`]s, parameterized by the values of the owning
/// node's parents (in parent order).
///
/// Implementations are stateless with respect to the graph: the node holds
/// the value, the graph supplies the parameters. Parameter values outside the
/// distribution's domain yield a log-probability of negative infinity, while a
/// parameter of the wrong kind is a [`TypeMismatch`] error.
///
/// [`TypeMismatch`]: phylomc_core::PhyloMcError::TypeMismatch
pub trait Distribution: fmt::Debug {
    /// Short name used in summaries and log records.
    fn name(&self) -> &str;

    /// `ln p(value | params)`.
    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64>;

    /// Draw a fresh value given the parameters.
    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value>;

    /// Called after the owning node's parent `old` was replaced by `new`.
    fn swap_parameter(&mut self, _old: NodeId, _new: NodeId) {}
}

/// Check the parameter count for a distribution or function.
pub(crate) fn expect_params(name: &str, params: &[&Value], n: usize) -> Result<()> {
    if params.len() != n {
        return Err(phylomc_core::PhyloMcError::Config(format!(
            "{} expects {} parameters, got {}",
            name,
            n,
            params.len()
        )));
    }
    Ok(())
}
