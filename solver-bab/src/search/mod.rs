//! Branch-and-bound search tree management.

mod branching;
mod node;
mod pseudocost;
mod tree;

pub use branching::{product_score, BranchOutcome, Brancher};
pub use node::{BabNode, BabNodeWithInfo, BranchStatus, BranchingHistoryInfo};
pub use pseudocost::PseudocostTable;
pub use tree::{tolerance_adjusted, BabTree};
