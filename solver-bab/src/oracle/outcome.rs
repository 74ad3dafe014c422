//! Result types returned by collaborators.

use serde::{Deserialize, Serialize};

/// Dual information from the relaxation, handed to postprocessing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualInfo {
    /// Multipliers of the variable bounds, one per variable (empty if unavailable).
    pub bound_multipliers: Vec<f64>,

    /// Objective value of the relaxation the multipliers belong to.
    pub relaxation_value: f64,
}

/// Result of a lower bounding solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LowerBoundOutcome {
    /// The box contains no feasible point.
    pub infeasible: bool,

    /// The relaxation is tight: its solution is optimal for the node.
    pub converged: bool,

    /// Valid lower bound on the node.
    pub lower_bound: f64,

    /// Relaxation solution (may be empty).
    pub solution_point: Vec<f64>,

    /// Dual information for postprocessing.
    pub dual_info: DualInfo,
}

impl LowerBoundOutcome {
    /// Outcome for a box that was proven infeasible.
    pub fn infeasible() -> Self {
        Self {
            infeasible: true,
            converged: false,
            lower_bound: f64::INFINITY,
            solution_point: Vec::new(),
            dual_info: DualInfo::default(),
        }
    }

    /// Outcome carrying a bound and the relaxation point.
    pub fn bound(lower_bound: f64, solution_point: Vec<f64>) -> Self {
        Self {
            infeasible: false,
            converged: false,
            lower_bound,
            solution_point,
            dual_info: DualInfo {
                bound_multipliers: Vec::new(),
                relaxation_value: lower_bound,
            },
        }
    }

    /// Mark the relaxation as tight.
    pub fn converged(mut self) -> Self {
        self.converged = true;
        self
    }

    /// Attach dual information.
    pub fn with_dual_info(mut self, dual_info: DualInfo) -> Self {
        self.dual_info = dual_info;
        self
    }
}

/// Result of an upper bounding solve.
#[derive(Debug, Clone, PartialEq)]
pub struct UpperBoundOutcome {
    /// A point better than the incumbent passed in was found.
    pub found_new_incumbent: bool,

    /// The point is optimal for the node; no further work is needed.
    pub converged: bool,

    /// Objective value of `point` (+inf if none).
    pub objective_value: f64,

    /// Feasible point (empty if none).
    pub point: Vec<f64>,
}

impl UpperBoundOutcome {
    /// No feasible point found.
    pub fn not_found() -> Self {
        Self {
            found_new_incumbent: false,
            converged: false,
            objective_value: f64::INFINITY,
            point: Vec::new(),
        }
    }

    /// A feasible point with its objective.
    ///
    /// `found_new_incumbent` is set when `objective_value < incumbent`.
    pub fn feasible(objective_value: f64, point: Vec<f64>, incumbent: f64) -> Self {
        Self {
            found_new_incumbent: objective_value < incumbent,
            converged: false,
            objective_value,
            point,
        }
    }

    /// Mark the node as solved.
    pub fn converged(mut self) -> Self {
        self.converged = true;
        self
    }
}
