//! Per-node state machine.

use serde::{Deserialize, Serialize};

/// Why a node was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FathomReason {
    /// The relaxation proved the box infeasible.
    Infeasible,

    /// Bound tightening emptied the box.
    TighteningInfeasible,

    /// The node's bound cannot beat the incumbent.
    ValueDominated,

    /// The node was solved to optimality.
    Converged,

    /// A fixed node was evaluated for the second time.
    FixedPointEvaluated,
}

/// Where a node is in its processing.
///
/// ```text
/// New -> Preprocessed -> LowerBounded -> UpperBounded -> Postprocessed
///                                                          -> Branched | Fixed | Dropped
/// ```
/// Any non-terminal state may also move to `Fathomed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Popped from the tree.
    New,
    /// Bound tightening applied.
    Preprocessed,
    /// Relaxation solved.
    LowerBounded,
    /// Local search done.
    UpperBounded,
    /// Duality-based tightening applied.
    Postprocessed,
    /// Discarded.
    Fathomed(FathomReason),
    /// Split into exactly two children.
    Branched,
    /// Every dimension fixed; re-queued unchanged.
    Fixed,
    /// Below the node size tolerance.
    Dropped,
}

impl NodeState {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Fathomed(_) | NodeState::Branched | NodeState::Fixed | NodeState::Dropped
        )
    }

    /// Check if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: NodeState) -> bool {
        use NodeState::*;

        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Fathomed(_)) => true,
            (New, Preprocessed)
            | (Preprocessed, LowerBounded)
            | (LowerBounded, UpperBounded)
            | (UpperBounded, Postprocessed) => true,
            (Postprocessed, Branched | Fixed | Dropped) => true,
            _ => false,
        }
    }
}

/// Status tag carried by manager and worker messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTag {
    /// Normal operation; as a broadcast, a regular shutdown.
    EverythingFine,

    /// Some process failed; as a broadcast, an abort.
    Exception,

    /// The node's relaxation was infeasible.
    Infeasible,

    /// Bound tightening proved the node infeasible.
    TighteningInfeasible,

    /// The node was bounded normally.
    Feasible,
}
