//! The proposal protocol and its tuning rule.

use std::fmt;

use phylomc_core::{random, PhyloMcError, Result};
use phylomc_dag::{ModelGraph, NodeId};
use rand::RngCore;

/// A reversible edit of one or more stochastic nodes.
///
/// One cycle runs `prepare`, `propose`, then either `keep` (accept) or
/// `undo` (reject), and always ends with `clean`. `propose` writes the new
/// values, touches every node it wrote, and returns the log Hastings ratio.
/// When no valid move exists it returns negative infinity and reports
/// [`failed`](Self::failed); `undo` is then a no-op.
pub trait Proposal: fmt::Debug {
    /// Short name used in summaries and log records.
    fn name(&self) -> &str;

    /// The nodes this proposal writes.
    fn nodes(&self) -> Vec<NodeId>;

    /// Bookkeeping before the edit. Must not write any value.
    fn prepare(&mut self, _graph: &mut ModelGraph) -> Result<()> {
        Ok(())
    }

    /// Perform the edit and return `ln(q(old | new) / q(new | old))` plus
    /// any Jacobian term.
    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64>;

    /// Reverse the last edit exactly.
    fn undo(&mut self, graph: &mut ModelGraph) -> Result<()>;

    /// Accept hook.
    fn keep(&mut self, _graph: &mut ModelGraph) -> Result<()> {
        Ok(())
    }

    /// Drop the undo buffer and the failed flag.
    fn clean(&mut self);

    /// True if the last `propose` found no valid move.
    fn failed(&self) -> bool;

    /// Move the tuning parameter toward the target acceptance rate.
    fn tune(&mut self, _acceptance_rate: f64, _config: &TuningConfig) {}

    /// Re-target the proposal after `old` was replaced by `new`.
    fn swap_node(&mut self, old: NodeId, new: NodeId);

    /// Tuning parameter(s) for summaries.
    fn parameter_summary(&self) -> String {
        String::new()
    }
}

/// Where a proposal is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProposalState {
    Idle,
    Prepared,
    Proposed,
    Accepted,
    Rejected,
}

impl ProposalState {
    /// True between cycles.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Accepted | Self::Rejected)
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Prepared => "prepared",
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Target and bounds for auto-tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TuningConfig {
    pub target_acceptance: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            target_acceptance: 0.44,
            min_scale: 1e-6,
            max_scale: 1e6,
        }
    }
}

impl TuningConfig {
    /// The target must lie strictly inside (0, 1) and the bounds must be
    /// positive and ordered.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
            return Err(PhyloMcError::Config(format!(
                "target acceptance {} outside (0, 1)",
                self.target_acceptance
            )));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(PhyloMcError::Config(format!(
                "scale bounds [{}, {}] are not positive and ordered",
                self.min_scale, self.max_scale
            )));
        }
        Ok(())
    }
}

/// Per-move settings for the scheduler and the tuner.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveConfig {
    /// Relative frequency with which a scheduler fires this move.
    pub weight: f64,
    /// Whether `auto_tune` adjusts the proposal.
    pub tune: bool,
    pub tuning: TuningConfig,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            weight: 1.0,
            tune: true,
            tuning: TuningConfig::default(),
        }
    }
}

/// One step of the multiplicative tuning rule, clamped to the config bounds.
///
/// Above the target the scale grows by `1 + (rate - target) / (1 - target)`;
/// otherwise it shrinks by `2 - rate / target`.
pub fn tuned_scale(scale: f64, acceptance_rate: f64, config: &TuningConfig) -> f64 {
    let target = config.target_acceptance;
    let next = if acceptance_rate > target {
        scale * (1.0 + (acceptance_rate - target) / (1.0 - target))
    } else {
        scale / (2.0 - acceptance_rate / target)
    };
    next.clamp(config.min_scale, config.max_scale)
}

/// A tunable proposal parameter.
///
/// Window widths and scale factors are tuned directly. Concentrations work
/// the other way round (a larger concentration gives smaller steps), so they
/// are tuned through their inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tuning {
    value: f64,
    inverse: bool,
}

impl Tuning {
    pub fn scale(value: f64) -> Self {
        Self {
            value,
            inverse: false,
        }
    }

    pub fn concentration(value: f64) -> Self {
        Self {
            value,
            inverse: true,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn tune(&mut self, acceptance_rate: f64, config: &TuningConfig) {
        self.value = if self.inverse {
            1.0 / tuned_scale(1.0 / self.value, acceptance_rate, config)
        } else {
            tuned_scale(self.value, acceptance_rate, config)
        };
    }
}

/// Replace `old` by `new` in place.
pub(crate) fn swap_id(id: &mut NodeId, old: NodeId, new: NodeId) {
    if *id == old {
        *id = new;
    }
}

/// A uniformly chosen element, or None if there is nothing to choose.
pub(crate) fn pick<T: Copy>(items: &[T], rng: &mut dyn RngCore) -> Result<Option<T>> {
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(items[random::uniform_index(rng, items.len())?]))
}
