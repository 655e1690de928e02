//! Time-calibrated rooted trees for phylomc.
//!
//! - **Tree** — [`TimeTree`], an arena of [`TreeNode`]s carrying ages, with
//!   prune/regraft/exchange edits that record exactly what they changed
//! - **Newick** — parsing and writing, ages derived from branch lengths
//! - **Bipartitions** — canonical tip-membership splits and Robinson-Foulds
//! - **Candidates** — edges spanning a given age, the legal regraft points
//! - **Population** — mapping gene-tree lineages onto species-tree populations

pub mod bipartition;
pub mod candidates;
pub mod newick;
pub mod population;
pub mod tree;

pub use bipartition::{bipartitions, robinson_foulds, Bipartition, TaxonOrder};
pub use candidates::{prunable_nodes, spanning_edges};
pub use population::PopulationWindow;
pub use tree::{NodeId, PruneRecord, TimeTree, TreeNode};
