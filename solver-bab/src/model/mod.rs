//! Problem variables and search outcome types.

mod solution;
mod variable;

pub use solution::{BabSolution, BabStatus, IncumbentTracker, SearchStats, Termination};
pub use variable::{OptimizationVariable, VariableType};
