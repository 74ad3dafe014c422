//! Search outcome types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status of the branch-and-bound search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BabStatus {
    /// Tree exhausted with an incumbent: the incumbent is globally optimal
    /// within the fathoming tolerances.
    GloballyOptimal,

    /// Tree exhausted without any feasible point.
    Infeasible,

    /// Node limit reached, best solution returned.
    NodeLimit,

    /// Wall-clock limit reached.
    WallTimeLimit,

    /// CPU-time limit reached.
    CpuTimeLimit,

    /// Open-node memory ceiling reached.
    MemoryLimit,

    /// Incumbent reached the target upper bound.
    TargetUpperBoundReached,

    /// Lowest open pruning score reached the target lower bound.
    TargetLowerBoundReached,

    /// A collaborator or protocol error aborted the search.
    Failed,
}

impl BabStatus {
    /// Returns true if the tree was explored completely.
    pub fn is_exhaustive(&self) -> bool {
        matches!(self, BabStatus::GloballyOptimal | BabStatus::Infeasible)
    }

    /// Returns true if the search stopped on a resource ceiling.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            BabStatus::NodeLimit
                | BabStatus::WallTimeLimit
                | BabStatus::CpuTimeLimit
                | BabStatus::MemoryLimit
        )
    }
}

/// Whether any work was still outstanding when the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Termination {
    /// No dispatched node is still pending.
    #[default]
    Terminated,

    /// Some workers had not returned their results when the drain window closed.
    TerminatedWorkersActive,
}

/// Counters collected during the search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Nodes taken out of the tree and processed.
    pub nodes_processed: u64,
    /// Nodes fathomed after processing.
    pub nodes_fathomed: u64,
    /// Open nodes fathomed by threshold updates.
    pub nodes_pruned_by_threshold: u64,
    /// Nodes split into two children.
    pub nodes_branched: u64,
    /// Nodes re-queued unchanged because every dimension was fixed.
    pub nodes_fixed: u64,
    /// Nodes dropped below the size tolerance.
    pub nodes_dropped: u64,
    /// Lower bounding solver calls.
    pub lbp_calls: u64,
    /// Upper bounding solver calls.
    pub ubp_calls: u64,
    /// Number of incumbent improvements.
    pub incumbent_updates: u64,
    /// Deepest node processed.
    pub max_depth: u32,
}

/// Final result of a branch-and-bound search.
#[derive(Debug, Clone, PartialEq)]
pub struct BabSolution {
    /// Search status.
    pub status: BabStatus,

    /// Whether results were still pending at the end.
    pub termination: Termination,

    /// Best feasible point (empty if none).
    pub x: Vec<f64>,

    /// Objective value of best point (+inf if none).
    pub obj_val: f64,

    /// Lowest pruning score among open nodes at the end (+inf if none).
    pub lower_bound: f64,

    /// Absolute gap between incumbent and lower bound.
    pub gap: f64,

    /// Search counters.
    pub stats: SearchStats,

    /// Wall-clock duration of the search.
    pub wall_time: Duration,

    /// Error message when the status is `Failed`.
    pub error: Option<String>,
}

impl BabSolution {
    /// Returns true if a feasible point was found.
    pub fn has_solution(&self) -> bool {
        !self.x.is_empty()
    }

    /// Absolute gap between incumbent and the best remaining bound.
    ///
    /// An exhausted tree (bound +inf) has zero gap.
    pub fn compute_gap(incumbent: f64, lower_bound: f64) -> f64 {
        if lower_bound == f64::INFINITY {
            return 0.0;
        }
        if incumbent.is_infinite() || lower_bound.is_infinite() {
            return f64::INFINITY;
        }
        (incumbent - lower_bound).max(0.0)
    }
}

/// Tracks the best known feasible point (incumbent).
#[derive(Debug, Clone, PartialEq)]
pub struct IncumbentTracker {
    /// Current best point (if any).
    pub solution: Option<Vec<f64>>,

    /// Objective value of incumbent (+inf if none).
    pub obj_val: f64,
}

impl Default for IncumbentTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IncumbentTracker {
    /// Create a new incumbent tracker.
    pub fn new() -> Self {
        Self {
            solution: None,
            obj_val: f64::INFINITY,
        }
    }

    /// Check if we have an incumbent.
    pub fn has_incumbent(&self) -> bool {
        self.solution.is_some()
    }

    /// Try to update incumbent with a new point.
    ///
    /// Returns true if the incumbent was improved.
    pub fn update(&mut self, x: &[f64], obj: f64) -> bool {
        if obj < self.obj_val {
            self.solution = Some(x.to_vec());
            self.obj_val = obj;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incumbent_tracker() {
        let mut tracker = IncumbentTracker::new();

        assert!(!tracker.has_incumbent());
        assert_eq!(tracker.obj_val, f64::INFINITY);

        // First solution
        assert!(tracker.update(&[1.0, 2.0], 10.0));
        assert!(tracker.has_incumbent());

        // Worse or equal solution (rejected)
        assert!(!tracker.update(&[2.0, 3.0], 15.0));
        assert!(!tracker.update(&[2.0, 3.0], 10.0));
        assert_eq!(tracker.obj_val, 10.0);

        // Better solution (accepted)
        assert!(tracker.update(&[0.5, 1.0], 5.0));
        assert_eq!(tracker.obj_val, 5.0);
        assert_eq!(tracker.solution.as_deref(), Some(&[0.5, 1.0][..]));
    }

    #[test]
    fn test_gap_computation() {
        assert_eq!(BabSolution::compute_gap(10.0, 8.0), 2.0);
        assert_eq!(BabSolution::compute_gap(10.0, f64::INFINITY), 0.0);
        assert_eq!(BabSolution::compute_gap(f64::INFINITY, 3.0), f64::INFINITY);
    }

    #[test]
    fn test_status_methods() {
        assert!(BabStatus::GloballyOptimal.is_exhaustive());
        assert!(BabStatus::Infeasible.is_exhaustive());
        assert!(!BabStatus::NodeLimit.is_exhaustive());

        assert!(BabStatus::MemoryLimit.is_resource_limit());
        assert!(!BabStatus::TargetLowerBoundReached.is_resource_limit());
    }
}
