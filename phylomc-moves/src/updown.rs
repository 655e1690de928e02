//! Joint scaling of positively and negatively correlated parameters.

use phylomc_core::{PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId, Value};
use rand::RngCore;

use crate::proposal::{swap_id, Proposal, Tuning, TuningConfig};
use crate::scale::scaling_factor;

/// Multiply every `up` node by a factor and divide every `down` node by it.
///
/// Reals and vector components scale directly; a tree scales the ages of its
/// internal nodes. Each scaled quantity adds one dimension to the Jacobian,
/// so `ln H = (n_up - n_down) ln factor`.
#[derive(Debug, Clone)]
pub struct UpDownScaleProposal {
    up: Vec<NodeId>,
    down: Vec<NodeId>,
    lambda: Tuning,
    stored: Vec<(NodeId, Value)>,
    failed: bool,
}

impl UpDownScaleProposal {
    pub fn new(up: Vec<NodeId>, down: Vec<NodeId>, lambda: f64) -> Result<Self> {
        if up.is_empty() && down.is_empty() {
            return Err(PhyloMcError::Config(
                "up-down scale needs at least one node".into(),
            ));
        }
        Ok(Self {
            up,
            down,
            lambda: Tuning::scale(lambda),
            stored: Vec::new(),
            failed: false,
        })
    }
}

/// Only reals, vectors and trees carry a scale.
fn ensure_scalable(value: &Value) -> Result<()> {
    match value {
        Value::Real(_) | Value::Vector(_) | Value::Tree(_) => Ok(()),
        other => Err(PhyloMcError::TypeMismatch {
            expected: "real, vector or tree",
            found: other.kind(),
        }),
    }
}

/// Scale `value` in place and return how many quantities changed.
fn scale_value(value: &mut Value, factor: f64) -> Result<usize> {
    ensure_scalable(value)?;
    match value {
        Value::Real(x) => {
            *x *= factor;
            Ok(1)
        }
        Value::Vector(v) => {
            v.iter_mut().for_each(|x| *x *= factor);
            Ok(v.len())
        }
        Value::Tree(tree) => {
            let root = tree.root();
            tree.rescale_subtree(root, factor);
            Ok(tree.internal_nodes().len())
        }
        other => Err(PhyloMcError::TypeMismatch {
            expected: "real, vector or tree",
            found: other.kind(),
        }),
    }
}

impl UpDownScaleProposal {
    /// Every target must exist and hold a scalable value.
    fn check_targets(&self, graph: &ModelGraph) -> Result<()> {
        for id in self.nodes() {
            ensure_scalable(graph.node(id)?.current_value())?;
        }
        Ok(())
    }

    /// Scale each target in turn, recording its old value first.
    fn scale_targets(&mut self, graph: &mut ModelGraph, factor: f64) -> Result<Option<i64>> {
        let targets: Vec<(NodeId, f64, i64)> = self
            .up
            .iter()
            .map(|&id| (id, factor, 1))
            .chain(self.down.iter().map(|&id| (id, 1.0 / factor, -1)))
            .collect();
        let mut dims: i64 = 0;
        for (id, f, sign) in targets {
            let value = graph.value_mut(id)?;
            self.stored.push((id, value.clone()));
            let n = scale_value(value, f)?;
            if let Value::Tree(tree) = value {
                if let Err(e) = tree.validate() {
                    tracing::warn!(node = %id, error = %e, "up-down scale broke age order");
                    return Ok(None);
                }
            }
            dims += sign * n as i64;
        }
        Ok(Some(dims))
    }

    fn revert(&mut self, graph: &mut ModelGraph) -> Result<()> {
        for (id, old) in self.stored.drain(..).rev() {
            *graph.value_mut(id)? = old;
        }
        Ok(())
    }
}

impl Proposal for UpDownScaleProposal {
    fn name(&self) -> &str {
        "UpDownScale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.up.iter().chain(&self.down).copied().collect()
    }

    fn prepare(&mut self, graph: &mut ModelGraph) -> Result<()> {
        self.check_targets(graph)
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        self.check_targets(graph)?;
        let factor = scaling_factor(self.lambda.value(), rng);
        let dims = match self.scale_targets(graph, factor) {
            Ok(Some(dims)) => dims,
            Ok(None) => {
                self.revert(graph)?;
                self.failed = true;
                return Ok(f64::NEG_INFINITY);
            }
            Err(e) => {
                self.revert(graph)?;
                return Err(e);
            }
        };
        for id in self.nodes() {
            graph.touch(id)?;
        }
        Ok(dims as f64 * factor.ln())
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

    fn tune(&mut self, acceptance_rate: f64, config: &TuningConfig) {
        self.lambda.tune(acceptance_rate, config);
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        for id in self.up.iter_mut().chain(self.down.iter_mut()) {
            swap_id(id, old, new);
        }
    }

    fn parameter_summary(&self) -> String {
        format!("lambda={}", self.lambda.value())
    }
}
