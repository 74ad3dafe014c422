//! Node processing: tightening, bounding and local search for one node.
//!
//! This is the part of the loop that does not touch the tree, so it runs
//! unchanged on the serial coordinator and inside distributed workers.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{FathomReason, NodeState, StatusTag};
use crate::error::{BabError, BabResult};
use crate::oracle::SolverSet;
use crate::search::{tolerance_adjusted, BabNode};

/// A feasible point better than the incumbent at the time it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncumbentPayload {
    /// Objective value.
    pub objective_value: f64,

    /// The point.
    pub point: Vec<f64>,
}

/// Incumbent value and fathoming tolerances a node is processed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruningCutoff {
    /// Best known objective (+inf if none).
    pub incumbent: f64,

    /// Relative fathoming tolerance.
    pub rel_tol: f64,

    /// Absolute fathoming tolerance.
    pub abs_tol: f64,
}

impl PruningCutoff {
    /// Cutoff with no incumbent.
    pub fn new(rel_tol: f64, abs_tol: f64) -> Self {
        Self {
            incumbent: f64::INFINITY,
            rel_tol,
            abs_tol,
        }
    }

    /// Pruning scores at or above this value are dominated.
    pub fn threshold(&self) -> f64 {
        tolerance_adjusted(self.incumbent, self.rel_tol, self.abs_tol)
    }

    /// Adopt a better incumbent. Returns true if the cutoff moved.
    pub fn tighten(&mut self, objective_value: f64) -> bool {
        if objective_value < self.incumbent {
            self.incumbent = objective_value;
            true
        } else {
            false
        }
    }
}

/// What processing a node produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    /// The node, with tightened bounds and updated pruning score.
    pub node: BabNode,

    /// Lower bound from the relaxation (+inf if infeasible).
    pub lower_bound: f64,

    /// Relaxation solution point.
    pub lbp_point: Vec<f64>,

    /// Lower bounding calls made.
    pub lbp_calls: u64,

    /// Upper bounding calls made.
    pub ubp_calls: u64,

    /// The node was proven infeasible.
    pub infeasible: bool,

    /// The node was solved.
    pub converged: bool,

    /// Outcome tag.
    pub status: StatusTag,

    /// Last state reached.
    pub state: NodeState,

    /// States visited, in order.
    pub trace: Vec<NodeState>,

    /// Better point found while processing, if any.
    pub new_incumbent: Option<IncumbentPayload>,

    /// Time spent processing.
    pub busy: Duration,
}

impl NodeReport {
    fn new(node: BabNode) -> Self {
        Self {
            node,
            lower_bound: f64::NEG_INFINITY,
            lbp_point: Vec::new(),
            lbp_calls: 0,
            ubp_calls: 0,
            infeasible: false,
            converged: false,
            status: StatusTag::Feasible,
            state: NodeState::New,
            trace: vec![NodeState::New],
            new_incumbent: None,
            busy: Duration::ZERO,
        }
    }

    fn advance(&mut self, next: NodeState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.trace.push(next);
    }

    fn fathom(mut self, reason: FathomReason, started: Instant) -> Self {
        if matches!(reason, FathomReason::Infeasible | FathomReason::TighteningInfeasible) {
            self.infeasible = true;
            self.node.pruning_score = f64::INFINITY;
            self.status = if reason == FathomReason::Infeasible {
                StatusTag::Infeasible
            } else {
                StatusTag::TighteningInfeasible
            };
        }
        if reason == FathomReason::Converged {
            self.converged = true;
        }
        self.advance(NodeState::Fathomed(reason));
        self.finish(started)
    }

    fn finish(mut self, started: Instant) -> Self {
        self.busy = started.elapsed();
        self
    }

    /// Returns true if the node still needs a branching decision.
    pub fn needs_branching(&self) -> bool {
        self.state == NodeState::Postprocessed
    }
}

/// Run tightening, bounding and local search on one node.
///
/// The returned report either ends in a `Fathomed` state or in
/// `Postprocessed`, in which case the caller decides how to branch.
pub fn process_node(solvers: &mut SolverSet, node: BabNode, cutoff: PruningCutoff) -> BabResult<NodeReport> {
    let started = Instant::now();
    let mut cutoff = cutoff;
    let mut report = NodeReport::new(node);

    // Preprocessing
    let infeasible = solvers.tightener.preprocess(&mut report.node, cutoff.incumbent)?;
    if infeasible || report.node.is_empty_box() {
        return Ok(report.fathom(FathomReason::TighteningInfeasible, started));
    }
    report.advance(NodeState::Preprocessed);

    // Lower bound
    report.lbp_calls += 1;
    let lbp = solvers.lower.solve(&report.node, cutoff.incumbent)?;
    if lbp.infeasible {
        report.lower_bound = f64::INFINITY;
        return Ok(report.fathom(FathomReason::Infeasible, started));
    }
    if lbp.lower_bound.is_nan() {
        return Err(BabError::Collaborator(format!(
            "lower bound of node {} is NaN",
            report.node.id
        )));
    }
    report.lower_bound = lbp.lower_bound;
    report.node.pruning_score = report.node.pruning_score.max(lbp.lower_bound);
    report.lbp_point = lbp.solution_point;
    report.advance(NodeState::LowerBounded);

    if !lbp.converged && report.node.pruning_score >= cutoff.threshold() {
        return Ok(report.fathom(FathomReason::ValueDominated, started));
    }

    // Upper bound, seeded at the relaxation point
    let seed: Vec<f64> = if report.lbp_point.len() == report.node.dimension() {
        report.lbp_point.clone()
    } else {
        (0..report.node.dimension()).map(|i| report.node.midpoint(i)).collect()
    };
    report.ubp_calls += 1;
    let ubp = solvers.upper.solve(&report.node, &seed, cutoff.incumbent)?;
    if ubp.found_new_incumbent && !ubp.point.is_empty() && cutoff.tighten(ubp.objective_value) {
        report.new_incumbent = Some(IncumbentPayload {
            objective_value: ubp.objective_value,
            point: ubp.point,
        });
    }
    report.advance(NodeState::UpperBounded);

    if lbp.converged || ubp.converged {
        return Ok(report.fathom(FathomReason::Converged, started));
    }
    if report.node.pruning_score >= cutoff.threshold() {
        return Ok(report.fathom(FathomReason::ValueDominated, started));
    }

    // Postprocessing
    let converged = solvers.tightener.postprocess(
        &mut report.node,
        &report.lbp_point,
        &lbp.dual_info,
        cutoff.incumbent,
    )?;
    if report.node.is_empty_box() {
        return Ok(report.fathom(FathomReason::TighteningInfeasible, started));
    }
    report.advance(NodeState::Postprocessed);

    if converged {
        return Ok(report.fathom(FathomReason::Converged, started));
    }
    Ok(report.finish(started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{
        BoundTightener, DualInfo, LowerBoundOutcome, LowerBoundSolver, UpperBoundOutcome, UpperBoundSolver,
    };

    /// Bounds `sum x_i` over the box.
    struct SumBound;

    impl LowerBoundSolver for SumBound {
        fn solve(&mut self, node: &BabNode, _incumbent: f64) -> BabResult<LowerBoundOutcome> {
            let lb = node.lower_bounds.iter().sum();
            Ok(LowerBoundOutcome::bound(lb, node.lower_bounds.clone()))
        }
    }

    /// Evaluates `sum x_i` at the seed.
    struct SumAtSeed;

    impl UpperBoundSolver for SumAtSeed {
        fn solve(&mut self, _node: &BabNode, seed: &[f64], incumbent: f64) -> BabResult<UpperBoundOutcome> {
            let obj = seed.iter().sum();
            Ok(UpperBoundOutcome::feasible(obj, seed.to_vec(), incumbent))
        }
    }

    struct Infeasible;

    impl LowerBoundSolver for Infeasible {
        fn solve(&mut self, _node: &BabNode, _incumbent: f64) -> BabResult<LowerBoundOutcome> {
            Ok(LowerBoundOutcome::infeasible())
        }
    }

    struct EmptyingTightener;

    impl BoundTightener for EmptyingTightener {
        fn preprocess(&mut self, node: &mut BabNode, _incumbent: f64) -> BabResult<bool> {
            node.lower_bounds[0] = node.upper_bounds[0] + 1.0;
            Ok(false)
        }
    }

    struct ConvergingPostprocess;

    impl BoundTightener for ConvergingPostprocess {
        fn postprocess(&mut self, _: &mut BabNode, _: &[f64], _: &DualInfo, _: f64) -> BabResult<bool> {
            Ok(true)
        }
    }

    fn unit_box() -> BabNode {
        BabNode::new(f64::NEG_INFINITY, vec![0.0, 1.0], vec![2.0, 3.0], 4, 1)
    }

    #[test]
    fn test_local_point_at_bound_fathoms_node() {
        let mut solvers = SolverSet::new(SumBound, SumAtSeed);
        let report = process_node(&mut solvers, unit_box(), PruningCutoff::new(0.0, 0.0)).unwrap();

        // The relaxation point is the lower corner, so the local search
        // finds the bound itself and the node converges by value.
        assert_eq!(report.lower_bound, 1.0);
        assert_eq!(report.node.pruning_score, 1.0);
        assert_eq!(report.lbp_calls, 1);
        assert_eq!(report.ubp_calls, 1);
        assert_eq!(
            report.new_incumbent,
            Some(IncumbentPayload {
                objective_value: 1.0,
                point: vec![0.0, 1.0],
            })
        );
        assert_eq!(report.state, NodeState::Fathomed(FathomReason::ValueDominated));
        assert!(!report.infeasible);
    }

    #[test]
    fn test_node_with_worse_local_point_is_postprocessed() {
        struct Midpoint;
        impl UpperBoundSolver for Midpoint {
            fn solve(&mut self, node: &BabNode, _: &[f64], incumbent: f64) -> BabResult<UpperBoundOutcome> {
                let point: Vec<f64> = (0..node.dimension()).map(|i| node.midpoint(i)).collect();
                Ok(UpperBoundOutcome::feasible(point.iter().sum(), point, incumbent))
            }
        }

        let mut solvers = SolverSet::new(SumBound, Midpoint);
        let report = process_node(&mut solvers, unit_box(), PruningCutoff::new(0.0, 0.0)).unwrap();

        assert!(report.needs_branching());
        assert_eq!(report.new_incumbent.as_ref().map(|i| i.objective_value), Some(3.0));
        assert_eq!(
            report.trace,
            vec![
                NodeState::New,
                NodeState::Preprocessed,
                NodeState::LowerBounded,
                NodeState::UpperBounded,
                NodeState::Postprocessed,
            ]
        );
    }

    #[test]
    fn test_dominated_node_skips_local_search() {
        let mut solvers = SolverSet::new(SumBound, SumAtSeed);
        let mut cutoff = PruningCutoff::new(0.0, 0.0);
        cutoff.tighten(0.5);

        let report = process_node(&mut solvers, unit_box(), cutoff).unwrap();

        assert_eq!(report.state, NodeState::Fathomed(FathomReason::ValueDominated));
        assert_eq!(report.ubp_calls, 0);
        assert!(report.new_incumbent.is_none());
    }

    #[test]
    fn test_infeasible_relaxation() {
        let mut solvers = SolverSet::new(Infeasible, SumAtSeed);
        let report = process_node(&mut solvers, unit_box(), PruningCutoff::new(0.0, 0.0)).unwrap();

        assert!(report.infeasible);
        assert_eq!(report.status, StatusTag::Infeasible);
        assert_eq!(report.node.pruning_score, f64::INFINITY);
        assert_eq!(report.state, NodeState::Fathomed(FathomReason::Infeasible));
    }

    #[test]
    fn test_tightening_infeasible() {
        let mut solvers = SolverSet::new(SumBound, SumAtSeed).with_tightener(EmptyingTightener);
        let report = process_node(&mut solvers, unit_box(), PruningCutoff::new(0.0, 0.0)).unwrap();

        assert_eq!(report.status, StatusTag::TighteningInfeasible);
        assert_eq!(report.lbp_calls, 0);
        assert_eq!(report.trace.len(), 2);
    }

    #[test]
    fn test_postprocess_convergence() {
        struct Nowhere;
        impl UpperBoundSolver for Nowhere {
            fn solve(&mut self, _: &BabNode, _: &[f64], _: f64) -> BabResult<UpperBoundOutcome> {
                Ok(UpperBoundOutcome::not_found())
            }
        }

        let mut solvers = SolverSet::new(SumBound, Nowhere).with_tightener(ConvergingPostprocess);
        let report = process_node(&mut solvers, unit_box(), PruningCutoff::new(0.0, 0.0)).unwrap();

        assert!(report.converged);
        assert_eq!(report.state, NodeState::Fathomed(FathomReason::Converged));
        assert_eq!(report.trace[report.trace.len() - 2], NodeState::Postprocessed);
    }

    #[test]
    fn test_nan_bound_is_an_error() {
        struct NanBound;
        impl LowerBoundSolver for NanBound {
            fn solve(&mut self, _: &BabNode, _: f64) -> BabResult<LowerBoundOutcome> {
                Ok(LowerBoundOutcome::bound(f64::NAN, Vec::new()))
            }
        }

        let mut solvers = SolverSet::new(NanBound, SumAtSeed);
        let err = process_node(&mut solvers, unit_box(), PruningCutoff::new(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, BabError::Collaborator(_)));
    }

    #[test]
    fn test_cutoff_threshold() {
        let mut cutoff = PruningCutoff::new(0.1, 0.5);
        assert_eq!(cutoff.threshold(), f64::INFINITY);

        assert!(cutoff.tighten(10.0));
        assert!(!cutoff.tighten(10.0));
        assert_eq!(cutoff.threshold(), 9.0);
    }
}
