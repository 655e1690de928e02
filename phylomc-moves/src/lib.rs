//! Metropolis-Hastings proposals for phylomc.
//!
//! A [`Proposal`] edits the values of a [`ModelGraph`](phylomc_dag::ModelGraph)
//! in place, touches what it wrote, and returns the log Hastings ratio. The
//! [`MetropolisHastingsMove`] wraps one proposal with the accept/reject
//! decision, the touch/keep/restore bookkeeping and acceptance counters.
//!
//! - **Scalar and vector** — [`ScaleProposal`], [`SlideProposal`],
//!   [`VectorElementScaleProposal`], [`UpDownScaleProposal`]
//! - **Simplex** — [`DirichletSimplexProposal`], [`BetaSimplexProposal`]
//! - **Tree** — fixed-age and Gibbs prune-and-regraft, narrow exchange,
//!   node-age slides, subtree scaling, and the species/gene coupled moves in
//!   [`tree`]
//!
//! A move that finds nothing legal to do returns negative infinity and sets
//! its `failed` flag; the driver rejects it without treating it as an error.

pub mod mh;
pub mod proposal;
pub mod scale;
pub mod simplex;
pub mod slide;
pub mod tree;
pub mod updown;

pub use mh::{CycleRatios, MetropolisHastingsMove};
pub use proposal::{tuned_scale, MoveConfig, Proposal, ProposalState, Tuning, TuningConfig};
pub use scale::{ScaleProposal, VectorElementScaleProposal};
pub use simplex::{BetaSimplexProposal, DirichletSimplexProposal};
pub use slide::SlideProposal;
pub use tree::{
    FixedNodeheightPruneRegraftProposal, GibbsPruneRegraftProposal, NarrowExchangeProposal,
    NodeTimeSlideUniformProposal, SpeciesNarrowExchangeProposal, SpeciesSubtreeScaleProposal,
    SubtreeScaleProposal,
};
pub use updown::UpDownScaleProposal;
