//! Collaborator contracts consumed by the search.
//!
//! The engine never evaluates the problem itself. A lower bounder, an upper
//! bounder and a bound tightener are plugged in through these traits, one
//! set per process.

mod outcome;

pub use outcome::{DualInfo, LowerBoundOutcome, UpperBoundOutcome};

use crate::error::BabResult;
use crate::search::BabNode;

/// Computes a valid lower bound on a node (the relaxation).
pub trait LowerBoundSolver {
    /// Solve the relaxation over the node's box.
    ///
    /// `incumbent` is the best known objective (+inf if none) and may be used
    /// as a cutoff.
    fn solve(&mut self, node: &BabNode, incumbent: f64) -> BabResult<LowerBoundOutcome>;
}

/// Searches for feasible points inside a node (the local solve).
pub trait UpperBoundSolver {
    /// Look for a feasible point seeded at `seed_point`.
    fn solve(&mut self, node: &BabNode, seed_point: &[f64], incumbent: f64) -> BabResult<UpperBoundOutcome>;
}

/// Shrinks node boxes before and after bounding.
///
/// Both hooks mutate the node's bounds in place. The defaults do nothing.
pub trait BoundTightener {
    /// Tighten before the lower bound is computed.
    ///
    /// Returns true if the box was proven infeasible.
    fn preprocess(&mut self, _node: &mut BabNode, _incumbent: f64) -> BabResult<bool> {
        Ok(false)
    }

    /// Tighten using the relaxation solution and its duals.
    ///
    /// Returns true if the node is solved and can be fathomed.
    fn postprocess(
        &mut self,
        _node: &mut BabNode,
        _lbp_point: &[f64],
        _dual_info: &DualInfo,
        _incumbent: f64,
    ) -> BabResult<bool> {
        Ok(false)
    }
}

/// Tightener that leaves every box unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTightening;

impl BoundTightener for NoTightening {}

/// The collaborators owned by one process.
pub struct SolverSet {
    /// Relaxation.
    pub lower: Box<dyn LowerBoundSolver + Send>,

    /// Local search.
    pub upper: Box<dyn UpperBoundSolver + Send>,

    /// Pre/post processing.
    pub tightener: Box<dyn BoundTightener + Send>,
}

impl SolverSet {
    /// Bundle bounders without bound tightening.
    pub fn new(
        lower: impl LowerBoundSolver + Send + 'static,
        upper: impl UpperBoundSolver + Send + 'static,
    ) -> Self {
        Self {
            lower: Box::new(lower),
            upper: Box::new(upper),
            tightener: Box::new(NoTightening),
        }
    }

    /// Replace the tightener.
    pub fn with_tightener(mut self, tightener: impl BoundTightener + Send + 'static) -> Self {
        self.tightener = Box::new(tightener);
        self
    }
}

impl std::fmt::Debug for SolverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverSet").finish_non_exhaustive()
    }
}
