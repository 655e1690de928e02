//! Model graph for phylomc.
//!
//! A probabilistic model is a directed acyclic graph of [`DagNode`]s owned by
//! a [`ModelGraph`] arena:
//!
//! - **Constant** nodes hold fixed values
//! - **Stochastic** nodes draw their value from a [`Distribution`] of their
//!   parents and contribute a log-probability; clamped ones are observed data
//! - **Deterministic** nodes hold a [`Function`] of their parents, recomputed
//!   lazily when read
//!
//! Edits follow the touch/keep/restore protocol: `touch` marks everything
//! downstream stale, `keep` commits the new state, `restore` rolls it back to
//! the last committed values without recomputing anything.

pub mod distribution;
pub mod distributions;
pub mod function;
pub mod functions;
pub mod graph;
pub mod node;
pub mod value;

pub use distribution::Distribution;
pub use function::Function;
pub use graph::ModelGraph;
pub use node::{DagNode, NodeId, NodeKind};
pub use value::{Value, ValueCell};
