//! Structured error types for phylomc.

use thiserror::Error;

/// Unified error type for graph construction, tree editing, and proposals.
///
/// Proposal infeasibility is deliberately absent: a move that finds nothing
/// to do reports a log Hastings ratio of negative infinity instead.
#[derive(Debug, Error)]
pub enum PhyloMcError {
    /// Invalid input (bad arguments, out-of-range values, unknown ids)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model configuration error (unknown parent, mismatched dimensions)
    #[error("configuration error: {0}")]
    Config(String),

    /// An edge insertion would make the model graph cyclic
    #[error("cycle detected: {0}")]
    Cycle(String),

    /// A node holds a value of the wrong kind for its reader
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Proposal state machine used out of order
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed Newick input
    #[error("parse error: {0}")]
    Parse(String),

    /// Numerical domain violation (NaN probability, broken age ordering)
    #[error("numerical error: {0}")]
    Numerical(String),
}

/// Convenience alias used throughout phylomc.
pub type Result<T> = std::result::Result<T, PhyloMcError>;
