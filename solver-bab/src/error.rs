//! Error types for the branch-and-bound search engine.

use thiserror::Error;

/// Errors that can occur while configuring or driving the search.
///
/// Infeasible or non-converged subproblems are not errors; they travel as
/// flags in the solver outcomes. Everything here is either a configuration
/// problem detected up front or a protocol violation that aborts the search.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BabError {
    /// `pop_next_node` was called on an empty tree.
    #[error("Cannot pop from an empty branch-and-bound tree")]
    EmptyTree,

    /// A node id was confirmed that is not awaiting a response.
    #[error("Node {0} is not awaiting a response")]
    UnknownNodeId(u64),

    /// A variable's type is incompatible with its bounds.
    #[error("Invalid variable type for '{name}': {reason}")]
    InvalidVariableType {
        /// Variable name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A strategy name could not be parsed.
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Problem validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Settings validation failed
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// An external collaborator (relaxation, local solver, tightener) failed.
    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    /// A worker reported a failure.
    #[error("Worker {worker} failed: {message}")]
    WorkerFailed {
        /// Worker index.
        worker: usize,
        /// Failure message reported by the worker.
        message: String,
    },

    /// A message was malformed or arrived out of protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A message channel was closed unexpectedly.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type for branch-and-bound operations.
pub type BabResult<T> = Result<T, BabError>;
