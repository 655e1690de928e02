//! The Metropolis-Hastings move: one proposal plus acceptance bookkeeping.

use std::io;

use phylomc_core::{random, PhyloMcError, Result, Summarizable};
use phylomc_dag::ModelGraph;
use rand::RngCore;

use crate::proposal::{MoveConfig, Proposal, ProposalState};

/// Drives one [`Proposal`] through prepare, propose, and accept or reject,
/// and keeps the acceptance counters the tuner reads.
#[derive(Debug)]
pub struct MetropolisHastingsMove {
    proposal: Box<dyn Proposal>,
    config: MoveConfig,
    state: ProposalState,
    heat: f64,
    tries: usize,
    accepted: usize,
    period_tries: usize,
    period_accepted: usize,
}

/// Log ratios of one proposed edit, split the way the acceptance test
/// weighs them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRatios {
    pub ln_likelihood: f64,
    pub ln_prior: f64,
    pub ln_hastings: f64,
}

impl CycleRatios {
    /// `heat * likelihood + prior + hastings`.
    pub fn ln_acceptance(&self, heat: f64) -> f64 {
        heat * self.ln_likelihood + self.ln_prior + self.ln_hastings
    }
}

impl MetropolisHastingsMove {
    pub fn new(proposal: impl Proposal + 'static, config: MoveConfig) -> Result<Self> {
        Self::boxed(Box::new(proposal), config)
    }

    /// Like [`new`](Self::new) for a proposal that is already boxed.
    pub fn boxed(proposal: Box<dyn Proposal>, config: MoveConfig) -> Result<Self> {
        config.tuning.validate()?;
        if !(config.weight > 0.0) {
            return Err(PhyloMcError::Config(format!(
                "move weight {} must be positive",
                config.weight
            )));
        }
        Ok(Self {
            proposal,
            config,
            state: ProposalState::Idle,
            heat: 1.0,
            tries: 0,
            accepted: 0,
            period_tries: 0,
            period_accepted: 0,
        })
    }

    /// Multiply the likelihood ratio by `heat`, as a tempered chain does.
    pub fn with_heat(mut self, heat: f64) -> Self {
        self.heat = heat;
        self
    }

    pub fn name(&self) -> &str {
        self.proposal.name()
    }

    pub fn proposal(&self) -> &dyn Proposal {
        self.proposal.as_ref()
    }

    pub fn proposal_mut(&mut self) -> &mut dyn Proposal {
        self.proposal.as_mut()
    }

    pub fn config(&self) -> &MoveConfig {
        &self.config
    }

    pub fn weight(&self) -> f64 {
        self.config.weight
    }

    pub fn heat(&self) -> f64 {
        self.heat
    }

    pub fn state(&self) -> ProposalState {
        self.state
    }

    pub fn tries(&self) -> usize {
        self.tries
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Accepted over tried since construction or the last reset, 0 before
    /// the first try.
    pub fn acceptance_rate(&self) -> f64 {
        if self.tries == 0 {
            0.0
        } else {
            self.accepted as f64 / self.tries as f64
        }
    }

    pub fn reset_counters(&mut self) {
        self.tries = 0;
        self.accepted = 0;
        self.period_tries = 0;
        self.period_accepted = 0;
    }

    fn expect_state(&self, ok: bool, action: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(PhyloMcError::Protocol(format!(
                "{}: cannot {} while {}",
                self.name(),
                action,
                self.state
            )))
        }
    }

    /// Start a cycle. Refused while any other edit of the graph is in flight.
    pub fn prepare(&mut self, graph: &mut ModelGraph) -> Result<()> {
        self.expect_state(self.state.is_settled(), "prepare")?;
        if !graph.touched_nodes().is_empty() {
            return Err(PhyloMcError::Protocol(format!(
                "{}: {} nodes are already touched by another edit",
                self.name(),
                graph.touched_nodes().len()
            )));
        }
        self.proposal.prepare(graph)?;
        self.state = ProposalState::Prepared;
        Ok(())
    }

    /// Perform the edit and split the resulting log ratios.
    pub fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<CycleRatios> {
        self.expect_state(self.state == ProposalState::Prepared, "propose")?;
        let ln_hastings = self.proposal.propose(graph, rng)?;
        self.state = ProposalState::Proposed;
        self.tries += 1;
        self.period_tries += 1;

        let mut ratios = CycleRatios {
            ln_likelihood: 0.0,
            ln_prior: 0.0,
            ln_hastings,
        };
        if ln_hastings == f64::NEG_INFINITY {
            return Ok(ratios);
        }
        for id in graph.touched_nodes().to_vec() {
            let node = graph.node(id)?;
            if !node.is_stochastic() {
                continue;
            }
            let clamped = node.is_clamped();
            let ratio = graph.ln_probability_ratio(id)?;
            if clamped {
                ratios.ln_likelihood += ratio;
            } else {
                ratios.ln_prior += ratio;
            }
        }
        Ok(ratios)
    }

    /// Commit the proposed edit.
    pub fn accept(&mut self, graph: &mut ModelGraph) -> Result<()> {
        self.expect_state(self.state == ProposalState::Proposed, "accept")?;
        graph.keep_touched()?;
        self.proposal.keep(graph)?;
        self.proposal.clean();
        self.accepted += 1;
        self.period_accepted += 1;
        self.state = ProposalState::Accepted;
        Ok(())
    }

    /// Undo the proposed edit and restore every touched node.
    pub fn reject(&mut self, graph: &mut ModelGraph) -> Result<()> {
        self.expect_state(self.state == ProposalState::Proposed, "reject")?;
        if !self.proposal.failed() {
            self.proposal.undo(graph)?;
        }
        graph.restore_touched()?;
        self.proposal.clean();
        self.state = ProposalState::Rejected;
        Ok(())
    }

    /// Run one full cycle. Returns true if the edit was accepted.
    pub fn perform(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<bool> {
        self.prepare(graph)?;
        let ratios = self.propose(graph, rng)?;

        let accept = if self.proposal.failed() || ratios.ln_hastings == f64::NEG_INFINITY {
            tracing::warn!(proposal = self.name(), "no valid move; rejecting");
            false
        } else if !(ratios.ln_likelihood + ratios.ln_prior).is_finite() {
            false
        } else {
            let ln_alpha = ratios.ln_acceptance(self.heat);
            ln_alpha >= 0.0 || random::uniform01(&mut *rng).ln() < ln_alpha
        };

        if accept {
            self.accept(graph)?;
        } else {
            self.reject(graph)?;
        }
        tracing::debug!(
            proposal = self.name(),
            accepted = accept,
            ln_likelihood = ratios.ln_likelihood,
            ln_prior = ratios.ln_prior,
            ln_hastings = ratios.ln_hastings,
            "move"
        );
        Ok(accept)
    }

    /// Tune the proposal with the acceptance rate since the last call.
    pub fn auto_tune(&mut self) {
        if !self.config.tune || self.period_tries == 0 {
            return;
        }
        let rate = self.period_accepted as f64 / self.period_tries as f64;
        self.proposal.tune(rate, &self.config.tuning);
        tracing::debug!(
            proposal = self.name(),
            rate,
            parameters = %self.proposal.parameter_summary(),
            "tuned"
        );
        self.period_tries = 0;
        self.period_accepted = 0;
    }

    /// Column header matching [`print_summary`](Self::print_summary).
    pub fn summary_header() -> String {
        format!(
            "{:<36} {:>8} {:>10} {:>10} {:>9}  parameters",
            "move", "weight", "tries", "accepted", "rate"
        )
    }

    /// Write one summary row.
    pub fn print_summary<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.summary())
    }
}

impl Summarizable for MetropolisHastingsMove {
    fn summary(&self) -> String {
        format!(
            "{:<36} {:>8.3} {:>10} {:>10} {:>9.4}  {}",
            self.name(),
            self.config.weight,
            self.tries,
            self.accepted,
            self.acceptance_rate(),
            self.proposal.parameter_summary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaleProposal;
    use phylomc_core::random::seeded_rng;
    use phylomc_dag::distributions::{Exponential, Normal};
    use phylomc_dag::NodeId;

    /// rate ~ Exp(1); x ~ Normal(0, rate), x clamped to 0.3.
    fn model() -> (ModelGraph, NodeId) {
        let mut g = ModelGraph::new();
        let one = g.add_constant("one", 1.0);
        let zero = g.add_constant("zero", 0.0);
        let rate = g.add_stochastic("rate", Exponential::new(), &[one], 0.8).unwrap();
        let x = g.add_stochastic("x", Normal, &[zero, rate], 0.3).unwrap();
        g.clamp(x, 0.3).unwrap();
        (g, rate)
    }

    #[test]
    fn rejects_bad_config() {
        let (_, rate) = model();
        let config = MoveConfig {
            weight: 0.0,
            ..MoveConfig::default()
        };
        assert!(MetropolisHastingsMove::new(ScaleProposal::new(rate, 1.0), config).is_err());
    }

    #[test]
    fn state_machine_order() {
        let (mut g, rate) = model();
        let mut mv =
            MetropolisHastingsMove::new(ScaleProposal::new(rate, 1.0), MoveConfig::default())
                .unwrap();
        let mut rng = seeded_rng(1);
        assert!(matches!(
            mv.propose(&mut g, &mut rng),
            Err(PhyloMcError::Protocol(_))
        ));
        mv.prepare(&mut g).unwrap();
        assert!(matches!(mv.accept(&mut g), Err(PhyloMcError::Protocol(_))));
        mv.propose(&mut g, &mut rng).unwrap();
        assert!(matches!(mv.prepare(&mut g), Err(PhyloMcError::Protocol(_))));
        mv.reject(&mut g).unwrap();
        assert_eq!(mv.state(), ProposalState::Rejected);
        assert!(g.touched_nodes().is_empty());
    }

    #[test]
    fn refuses_to_start_mid_edit() {
        let (mut g, rate) = model();
        g.set_value(rate, 1.0).unwrap();
        let mut mv =
            MetropolisHastingsMove::new(ScaleProposal::new(rate, 1.0), MoveConfig::default())
                .unwrap();
        assert!(matches!(mv.prepare(&mut g), Err(PhyloMcError::Protocol(_))));
    }

    #[test]
    fn ratios_split_likelihood_and_prior() {
        let (mut g, rate) = model();
        let mut mv =
            MetropolisHastingsMove::new(ScaleProposal::new(rate, 1.0), MoveConfig::default())
                .unwrap();
        let mut rng = seeded_rng(2);
        let before_prior = g.ln_prior().unwrap();
        let before_lik = g.ln_likelihood().unwrap();
        mv.prepare(&mut g).unwrap();
        let ratios = mv.propose(&mut g, &mut rng).unwrap();
        let after_prior = g.ln_prior().unwrap();
        let after_lik = g.ln_likelihood().unwrap();
        assert!((ratios.ln_prior - (after_prior - before_prior)).abs() < 1e-12);
        assert!((ratios.ln_likelihood - (after_lik - before_lik)).abs() < 1e-12);
        mv.accept(&mut g).unwrap();
        assert_eq!(mv.accepted(), 1);
    }

    #[test]
    fn perform_counts_and_restores() {
        let (mut g, rate) = model();
        let mut mv =
            MetropolisHastingsMove::new(ScaleProposal::new(rate, 1.0), MoveConfig::default())
                .unwrap();
        let mut rng = seeded_rng(3);
        for _ in 0..200 {
            let before = g.node(rate).unwrap().current_value().clone();
            let accepted = mv.perform(&mut g, &mut rng).unwrap();
            assert!(g.touched_nodes().is_empty());
            if !accepted {
                assert_eq!(g.node(rate).unwrap().current_value(), &before);
            }
        }
        assert_eq!(mv.tries(), 200);
        assert!(mv.accepted() > 0 && mv.accepted() < 200);
    }

    #[test]
    fn auto_tune_uses_period_rate() {
        let (mut g, rate) = model();
        let mut mv =
            MetropolisHastingsMove::new(ScaleProposal::new(rate, 0.01), MoveConfig::default())
                .unwrap();
        let mut rng = seeded_rng(4);
        for _ in 0..50 {
            mv.perform(&mut g, &mut rng).unwrap();
        }
        // tiny steps are almost always accepted, so the scale must grow
        mv.auto_tune();
        let summary = mv.proposal().parameter_summary();
        let lambda: f64 = summary.trim_start_matches("lambda=").parse().unwrap();
        assert!(lambda > 0.01);
    }

    #[test]
    fn summary_row() {
        let (_, rate) = model();
        let mv = MetropolisHastingsMove::new(ScaleProposal::new(rate, 1.0), MoveConfig::default())
            .unwrap();
        let mut out = Vec::new();
        mv.print_summary(&mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("Scale"));
        assert!(line.contains("lambda=1"));
        assert!(MetropolisHastingsMove::summary_header().starts_with("move"));
    }
}
