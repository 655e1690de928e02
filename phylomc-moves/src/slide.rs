//! Symmetric sliding window on a real.

use phylomc_core::{random, PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use rand::RngCore;

use crate::proposal::{swap_id, Proposal, Tuning, TuningConfig};

/// `x -> x + delta * (u - 1/2)`, reflected back into `[lower, upper]` when
/// bounds are set. Reflection keeps the window symmetric, so `ln H = 0`.
#[derive(Debug, Clone)]
pub struct SlideProposal {
    node: NodeId,
    delta: Tuning,
    bounds: Option<(f64, f64)>,
    stored: Option<f64>,
    failed: bool,
}

impl SlideProposal {
    pub fn new(node: NodeId, delta: f64) -> Self {
        Self {
            node,
            delta: Tuning::scale(delta),
            bounds: None,
            stored: None,
            failed: false,
        }
    }

    /// Reflect proposals at `lower` and `upper`.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Result<Self> {
        if !(lower < upper) {
            return Err(PhyloMcError::Config(format!(
                "slide bounds [{}, {}] are empty",
                lower, upper
            )));
        }
        self.bounds = Some((lower, upper));
        Ok(self)
    }
}

/// Fold `x` back into `[lo, hi]` by repeated reflection.
pub(crate) fn reflect(mut x: f64, lo: f64, hi: f64) -> f64 {
    let width = hi - lo;
    // reduce far excursions to one period first
    let period = 2.0 * width;
    x = lo + (x - lo).rem_euclid(period);
    if x > hi {
        x = 2.0 * hi - x;
    }
    x
}

impl Proposal for SlideProposal {
    fn name(&self) -> &str {
        "Slide"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let shift = self.delta.value() * (random::uniform01(rng) - 0.5);
        let x = graph.value_mut(self.node)?.as_real_mut()?;
        self.stored = Some(*x);
        let moved = *x + shift;
        *x = match self.bounds {
            Some((lo, hi)) => reflect(moved, lo, hi),
            None => moved,
        };
        graph.touch(self.node)?;
        Ok(0.0)
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
        self.delta.tune(acceptance_rate, config);
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.node, old, new);
    }

    fn parameter_summary(&self) -> String {
        format!("delta={}", self.delta.value())
    }
}
