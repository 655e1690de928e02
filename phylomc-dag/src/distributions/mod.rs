//! Reference distributions.
//!
//! Enough to assemble and test models without an external model builder:
//! scalar continuous densities, the Dirichlet over a simplex, and two priors
//! on time trees.

pub mod continuous;
pub mod simplex;
pub mod tree;

pub use continuous::{
    beta_ln_pdf, exponential_ln_pdf, gamma_ln_pdf, normal_ln_pdf, Beta, Exponential, Gamma,
    Normal, Uniform,
};
pub use simplex::{dirichlet_ln_pdf, Dirichlet};
pub use tree::{ConstantCoalescent, UniformTimeTree};
