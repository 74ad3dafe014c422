//! Branch-and-bound coordination: the per-node state machine, node
//! processing, and the serial driver.

mod context;
mod limits;
mod process;
mod serial;
mod state;

pub use context::SearchContext;
pub use limits::{resource_limit, ResourceUsage};
pub use process::{process_node, IncumbentPayload, NodeReport, PruningCutoff};
pub use serial::BranchAndBound;
pub use state::{FathomReason, NodeState, StatusTag};
