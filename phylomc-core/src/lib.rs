//! Shared primitives for the phylomc Bayesian inference engine.
//!
//! `phylomc-core` provides the foundation the graph, tree, and move crates
//! build on:
//!
//! - **Error types** — [`PhyloMcError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`]
//! - **Log-space probabilities** — [`LogProb`] and log-sum-exp helpers
//! - **Bitsets** — [`BitSet`], the backing store of tree bipartitions
//! - **Randomness** — the chain RNG and the variates proposals draw from
//! - **Special functions** — `ln_gamma` and `ln_beta` for the density kernels

pub mod bitset;
pub mod error;
pub mod prob;
pub mod random;
pub mod special;
pub mod traits;

pub use bitset::BitSet;
pub use error::{PhyloMcError, Result};
pub use prob::LogProb;
pub use random::ChainRng;
pub use traits::*;
