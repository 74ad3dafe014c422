//! Branch-and-bound search engine for box-constrained global optimization.
//!
//! The crate owns the search: the open-node tree, branching and pseudocost
//! learning, the per-node state machine and the serial and distributed
//! coordinators. Bounding itself is delegated to collaborators implementing
//! the traits in [`oracle`].

#![warn(missing_docs)]

pub mod bnb;
pub mod distributed;
pub mod error;
pub mod model;
pub mod oracle;
pub mod search;
pub mod settings;

pub use bnb::{BranchAndBound, FathomReason, NodeReport, NodeState, SearchContext};
pub use distributed::DistributedBranchAndBound;
pub use error::{BabError, BabResult};
pub use model::{BabSolution, BabStatus, IncumbentTracker, OptimizationVariable, SearchStats, Termination, VariableType};
pub use oracle::{
    BoundTightener, DualInfo, LowerBoundOutcome, LowerBoundSolver, NoTightening, SolverSet, UpperBoundOutcome,
    UpperBoundSolver,
};
pub use search::{BabNode, BabTree, Brancher, BranchOutcome};
pub use settings::{BabSettings, BranchingStrategy, NodeScoreFunction, NodeSelection};
