//! Proposals on the probability simplex.
//!
//! Both moves redraw a few components from a Dirichlet centred on their
//! current values and rescale the untouched components so the vector still
//! sums to one. The redrawn components plus one aggregate "remainder"
//! component form the reduced vector the Hastings ratio is computed on.

use phylomc_core::{random, PhyloMcError, Result};
use phylomc_dag::distributions::dirichlet_ln_pdf;
use phylomc_dag::{ModelGraph, NodeId};
use rand::RngCore;

use crate::proposal::{swap_id, Proposal, Tuning, TuningConfig};

/// Dirichlet shapes below this are treated as degenerate and the move fails
/// without evaluating any density.
pub const MIN_DIRICHLET_SHAPE: f64 = 1e-10;

/// `ln Dir(old | alpha * new) - ln Dir(new | alpha * old)` on reduced
/// vectors: backward over forward proposal density.
pub fn ln_hastings_ratio(old_reduced: &[f64], new_reduced: &[f64], alpha: f64) -> f64 {
    let backward: Vec<f64> = new_reduced.iter().map(|&x| alpha * x).collect();
    let forward: Vec<f64> = old_reduced.iter().map(|&x| alpha * x).collect();
    dirichlet_ln_pdf(old_reduced, &backward) - dirichlet_ln_pdf(new_reduced, &forward)
}

fn shapes_ok(reduced: &[f64], alpha: f64) -> bool {
    reduced.iter().all(|&x| alpha * x >= MIN_DIRICHLET_SHAPE)
}

/// Redraw `chosen` components of `x` in place.
///
/// Returns the log Hastings ratio including the `(n - k) ln f` term for the
/// rescaled remainder, or None when the draw is degenerate (in which case `x`
/// is untouched).
fn redraw_components(
    x: &mut [f64],
    chosen: &[usize],
    alpha: f64,
    rng: &mut dyn RngCore,
) -> Result<Option<f64>> {
    let n = x.len();
    let k = chosen.len();
    let mut old_reduced: Vec<f64> = chosen.iter().map(|&i| x[i]).collect();
    let old_rest: f64 = (0..n).filter(|i| !chosen.contains(i)).map(|i| x[i]).sum();
    if k < n {
        old_reduced.push(old_rest);
    }
    if !shapes_ok(&old_reduced, alpha) {
        return Ok(None);
    }
    let forward: Vec<f64> = old_reduced.iter().map(|&r| alpha * r).collect();
    let new_reduced = random::dirichlet(rng, &forward)?;
    if new_reduced.iter().any(|&r| !(r > 0.0)) || !shapes_ok(&new_reduced, alpha) {
        return Ok(None);
    }

    let mut ln_h = ln_hastings_ratio(&old_reduced, &new_reduced, alpha);
    if k < n {
        let factor = new_reduced[k] / old_rest;
        for i in (0..n).filter(|i| !chosen.contains(i)) {
            x[i] *= factor;
        }
        ln_h += (n - k) as f64 * factor.ln();
    }
    for (&i, &r) in chosen.iter().zip(&new_reduced) {
        x[i] = r;
    }
    Ok(Some(ln_h))
}

/// `k` distinct indices below `n`, uniformly.
fn choose_indices(n: usize, k: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>> {
    let mut pool: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = i + random::uniform_index(rng, n - i)?;
        pool.swap(i, j);
    }
    pool.truncate(k);
    Ok(pool)
}

/// Redraw `k` of the `n` components (all of them when `k >= n`) from a
/// Dirichlet with shapes `alpha * current`.
#[derive(Debug, Clone)]
pub struct DirichletSimplexProposal {
    node: NodeId,
    alpha: Tuning,
    k: usize,
    stored: Option<Vec<f64>>,
    failed: bool,
}

impl DirichletSimplexProposal {
    pub fn new(node: NodeId, alpha: f64, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(PhyloMcError::Config(
                "simplex move must redraw at least one component".into(),
            ));
        }
        if !(alpha > 0.0) {
            return Err(PhyloMcError::Config(format!(
                "concentration {} must be positive",
                alpha
            )));
        }
        Ok(Self {
            node,
            alpha: Tuning::concentration(alpha),
            k,
            stored: None,
            failed: false,
        })
    }
}

impl Proposal for DirichletSimplexProposal {
    fn name(&self) -> &str {
        "DirichletSimplex"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let x = graph.value_mut(self.node)?.as_simplex_mut()?;
        let k = self.k.min(x.len());
        let chosen = choose_indices(x.len(), k, rng)?;
        let old = x.clone();
        match redraw_components(x, &chosen, self.alpha.value(), rng)? {
            Some(ln_h) => {
                self.stored = Some(old);
                graph.touch(self.node)?;
                Ok(ln_h)
            }
            None => {
                self.failed = true;
                Ok(f64::NEG_INFINITY)
            }
        }
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some(old) = &self.stored {
            graph
                .value_mut(self.node)?
                .as_simplex_mut()?
                .clone_from(old);
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
        self.alpha.tune(acceptance_rate, config);
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.node, old, new);
    }

    fn parameter_summary(&self) -> String {
        format!("alpha={} k={}", self.alpha.value(), self.k)
    }
}

/// Redraw one component from `Beta(alpha x_i, alpha (1 - x_i))` and rescale
/// the rest.
#[derive(Debug, Clone)]
pub struct BetaSimplexProposal {
    node: NodeId,
    alpha: Tuning,
    stored: Option<Vec<f64>>,
    failed: bool,
}

impl BetaSimplexProposal {
    pub fn new(node: NodeId, alpha: f64) -> Result<Self> {
        if !(alpha > 0.0) {
            return Err(PhyloMcError::Config(format!(
                "concentration {} must be positive",
                alpha
            )));
        }
        Ok(Self {
            node,
            alpha: Tuning::concentration(alpha),
            stored: None,
            failed: false,
        })
    }
}

impl Proposal for BetaSimplexProposal {
    fn name(&self) -> &str {
        "BetaSimplex"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64> {
        let x = graph.value_mut(self.node)?.as_simplex_mut()?;
        if x.len() < 2 {
            self.failed = true;
            return Ok(f64::NEG_INFINITY);
        }
        let i = random::uniform_index(rng, x.len())?;
        let old = x.clone();
        match redraw_components(x, &[i], self.alpha.value(), rng)? {
            Some(ln_h) => {
                self.stored = Some(old);
                graph.touch(self.node)?;
                Ok(ln_h)
            }
            None => {
                self.failed = true;
                Ok(f64::NEG_INFINITY)
            }
        }
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()> {
        if let Some(old) = &self.stored {
            graph
                .value_mut(self.node)?
                .as_simplex_mut()?
                .clone_from(old);
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
        self.alpha.tune(acceptance_rate, config);
    }

    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        swap_id(&mut self.node, old, new);
    }

    fn parameter_summary(&self) -> String {
        format!("alpha={}", self.alpha.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylomc_core::random::seeded_rng;
    use phylomc_dag::distributions::Dirichlet;
    use phylomc_dag::Value;

    const TOL: f64 = 1e-9;

    fn simplex_graph(x: Vec<f64>) -> (ModelGraph, NodeId) {
        let mut g = ModelGraph::new();
        let alpha = g.add_constant("alpha", Value::Vector(vec![1.0; x.len()]));
        let s = g.add_stochastic("pi", Dirichlet, &[alpha], Value::Simplex(x)).unwrap();
        (g, s)
    }

    fn current(g: &ModelGraph, id: NodeId) -> Vec<f64> {
        g.node(id).unwrap().current_value().as_simplex().unwrap().to_vec()
    }

    #[test]
    fn hastings_is_antisymmetric() {
        let a = [0.2, 0.3, 0.5];
        let b = [0.25, 0.25, 0.5];
        let sum = ln_hastings_ratio(&a, &b, 10.0) + ln_hastings_ratio(&b, &a, 10.0);
        assert!(sum.abs() < TOL);
        assert_eq!(ln_hastings_ratio(&a, &a, 10.0), 0.0);
    }

    #[test]
    fn k_of_n_stays_on_simplex() {
        let (mut g, s) = simplex_graph(vec![0.1, 0.2, 0.3, 0.4]);
        let mut p = DirichletSimplexProposal::new(s, 50.0, 2).unwrap();
        let mut rng = seeded_rng(31);
        for _ in 0..200 {
            let ln_h = p.propose(&mut g, &mut rng).unwrap();
            assert!(ln_h.is_finite());
            let x = current(&g, s);
            assert!((x.iter().sum::<f64>() - 1.0).abs() < TOL);
            assert!(x.iter().all(|&v| v > 0.0));
            p.undo(&mut g).unwrap();
            g.restore_touched().unwrap();
            p.clean();
            assert_eq!(current(&g, s), vec![0.1, 0.2, 0.3, 0.4]);
        }
    }

    #[test]
    fn untouched_components_keep_their_ratio() {
        let mut x = vec![0.1, 0.2, 0.3, 0.4];
        let mut rng = seeded_rng(32);
        redraw_components(&mut x, &[3], 20.0, &mut rng).unwrap().unwrap();
        assert!((x[1] / x[0] - 2.0).abs() < TOL);
        assert!((x[2] / x[0] - 3.0).abs() < TOL);
    }

    #[test]
    fn jacobian_term_uses_untouched_count() {
        let old = vec![0.1, 0.2, 0.3, 0.4];
        let mut x = old.clone();
        let mut rng = seeded_rng(33);
        let ln_h = redraw_components(&mut x, &[0], 20.0, &mut rng).unwrap().unwrap();
        let old_reduced = [old[0], 0.9];
        let new_reduced = [x[0], 1.0 - x[0]];
        let factor = new_reduced[1] / 0.9;
        let expected = ln_hastings_ratio(&old_reduced, &new_reduced, 20.0) + 3.0 * factor.ln();
        assert!((ln_h - expected).abs() < 1e-8);
    }

    #[test]
    fn degenerate_shape_fails_without_change() {
        let (mut g, s) = simplex_graph(vec![1e-13, 0.5, 0.5 - 1e-13]);
        let mut p = DirichletSimplexProposal::new(s, 1.0, 3).unwrap();
        let mut rng = seeded_rng(34);
        assert_eq!(p.propose(&mut g, &mut rng).unwrap(), f64::NEG_INFINITY);
        assert!(p.failed());
        assert!(g.touched_nodes().is_empty());
        assert_eq!(current(&g, s), vec![1e-13, 0.5, 0.5 - 1e-13]);
    }

    #[test]
    fn beta_simplex_undo() {
        let (mut g, s) = simplex_graph(vec![0.2, 0.3, 0.5]);
        let mut p = BetaSimplexProposal::new(s, 10.0).unwrap();
        let mut rng = seeded_rng(35);
        assert!(p.propose(&mut g, &mut rng).unwrap().is_finite());
        assert_ne!(current(&g, s), vec![0.2, 0.3, 0.5]);
        p.undo(&mut g).unwrap();
        assert_eq!(current(&g, s), vec![0.2, 0.3, 0.5]);
    }

    #[test]
    fn concentration_tunes_inversely() {
        let (_, s) = simplex_graph(vec![0.5, 0.5]);
        let mut p = DirichletSimplexProposal::new(s, 100.0, 1).unwrap();
        p.tune(0.95, &TuningConfig::default());
        assert!(p.parameter_summary().starts_with("alpha="));
        assert!(p.alpha.value() < 100.0);
        assert!(DirichletSimplexProposal::new(s, 1.0, 0).is_err());
    }
}
