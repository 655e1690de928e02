//! Multiplicative scaling of positive reals.

use phylomc_core::{random, Result};
use phylomc_dag::{ModelGraph, NodeId};
use rand::RngCore;

use crate::proposal::{swap_id, Proposal, Tuning, TuningConfig};

/// The factor `exp(lambda * (u - 1/2))` with `u ~ U(0, 1)`.
pub(crate) fn scaling_factor(lambda: f64, rng: &mut dyn RngCore) -> f64 {
    (lambda * (random::uniform01(rng) - 0.5)).exp()
}

/// `x -> x * exp(lambda * (u - 1/2))`; `ln H = ln factor`.
#[derive(Debug, Clone)]
pub struct ScaleProposal {
    node: NodeId,
    lambda: Tuning,
    stored: Option<f64>,
    failed: bool,
}

impl ScaleProposal {
    pub fn new(node: NodeId, lambda: f64) -> Self {
        Self {
            node,
            lambda: Tuning::scale(lambda),
            stored: None,
            failed: false,
        }
    }
}

impl Proposal for ScaleProposal {
    fn name(&self) -> &str {
        "Scale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let factor = scaling_factor(self.lambda.value(), rng);
        let x = graph.value_mut(self.node)?.as_real_mut()?;
        self.stored = Some(*x);
        *x *= factor;
        graph.touch(self.node)?;
        Ok(factor.ln())
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some(old) = self.stored {
            *graph.value_mut(self.node)?.as_real_mut()? = old;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.stored = None;
        self.failed = false;
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn tune(&mut self, acceptance_rate: f64, config: &TuningConfig) {
        self.lambda.tune(acceptance_rate, config);
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.node, old, new);
    }

    fn parameter_summary(&self) -> String {
        format!("lambda={}", self.lambda.value())
    }
}

/// Scale one uniformly chosen element of a vector.
#[derive(Debug, Clone)]
pub struct VectorElementScaleProposal {
    node: NodeId,
    lambda: Tuning,
    stored: Option<(usize, f64)>,
    failed: bool,
}

impl VectorElementScaleProposal {
    pub fn new(node: NodeId, lambda: f64) -> Self {
        Self {
            node,
            lambda: Tuning::scale(lambda),
            stored: None,
            failed: false,
        }
    }
}

impl Proposal for VectorElementScaleProposal {
    fn name(&self) -> &str {
        "VectorElementScale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let factor = scaling_factor(self.lambda.value(), rng);
        let v = graph.value_mut(self.node)?.as_vector_mut()?;
        if v.is_empty() {
            self.failed = true;
            return Ok(f64::NEG_INFINITY);
        }
        let i = random::uniform_index(rng, v.len())?;
        self.stored = Some((i, v[i]));
        v[i] *= factor;
        graph.touch(self.node)?;
        Ok(factor.ln())
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some((i, old)) = self.stored {
            graph.value_mut(self.node)?.as_vector_mut()?[i] = old;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.stored = None;
        self.failed = false;
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn tune(&mut self, acceptance_rate: f64, config: &TuningConfig) {
        self.lambda.tune(acceptance_rate, config);
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.node, old, new);
    }

    fn parameter_summary(&self) -> String {
        format!("lambda={}", self.lambda.value())
    }
}
