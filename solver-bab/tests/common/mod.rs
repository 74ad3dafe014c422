//! Separable test problems with interval-style collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solver_bab::{
    BabError, BabNode, BabResult, LowerBoundOutcome, LowerBoundSolver, OptimizationVariable, SolverSet,
    UpperBoundOutcome, UpperBoundSolver,
};

/// Global minimum of `x^4 - 3x^2 + x` on [-2, 2].
pub const QUARTIC_MIN: f64 = -3.513_905_038_9;

/// One separable term of the objective.
#[derive(Debug, Clone, Copy)]
pub enum Term {
    /// `x^4 - 3x^2 + x`
    Quartic,
    /// `(n - target)^2` on an integer variable
    Square { target: f64 },
}

impl Term {
    fn value(&self, x: f64) -> f64 {
        match *self {
            Term::Quartic => quartic(x),
            Term::Square { target } => (x - target).powi(2),
        }
    }

    /// Lower bound over [lb, ub] and the point it refers to.
    fn bound(&self, lb: f64, ub: f64) -> (f64, f64) {
        match *self {
            Term::Quartic => (quartic_lower_bound(lb, ub), 0.5 * (lb + ub)),
            Term::Square { target } => {
                let x = target.clamp(lb, ub);
                ((x - target).powi(2), x)
            }
        }
    }

    /// Feasible point near `seed` inside [lb, ub].
    fn local_point(&self, seed: f64, lb: f64, ub: f64) -> f64 {
        match self {
            Term::Quartic => seed.clamp(lb, ub),
            Term::Square { .. } => seed.round().clamp(lb, ub),
        }
    }
}

fn quartic(x: f64) -> f64 {
    x.powi(4) - 3.0 * x * x + x
}

fn square_range(lb: f64, ub: f64) -> (f64, f64) {
    if lb <= 0.0 && 0.0 <= ub {
        (0.0, (lb * lb).max(ub * ub))
    } else {
        let (a, b) = (lb * lb, ub * ub);
        (a.min(b), a.max(b))
    }
}

/// Natural interval extension intersected with the mean-value form.
fn quartic_lower_bound(lb: f64, ub: f64) -> f64 {
    let (sq_lo, sq_hi) = square_range(lb, ub);
    let natural = sq_lo * sq_lo - 3.0 * sq_hi + lb;

    let mid = 0.5 * (lb + ub);
    let radius = 0.5 * (ub - lb);
    let slope_lo = 4.0 * lb.powi(3) - 6.0 * ub + 1.0;
    let slope_hi = 4.0 * ub.powi(3) - 6.0 * lb + 1.0;
    let mean_value = quartic(mid) - slope_lo.abs().max(slope_hi.abs()) * radius;

    natural.max(mean_value)
}

/// A separable objective `sum_i term_i(x_i)`.
#[derive(Debug, Clone)]
pub struct Separable {
    pub terms: Vec<Term>,
}

impl Separable {
    /// `n` quartic terms on [-2, 2].
    pub fn quartic(n: usize) -> Self {
        Self {
            terms: vec![Term::Quartic; n],
        }
    }

    pub fn variables(&self) -> Vec<OptimizationVariable> {
        self.terms
            .iter()
            .enumerate()
            .map(|(i, term)| match term {
                Term::Quartic => OptimizationVariable::continuous(-2.0, 2.0, format!("x{i}")),
                Term::Square { .. } => OptimizationVariable::integer(0.0, 5.0, format!("n{i}")),
            })
            .collect()
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        self.terms.iter().zip(x).map(|(t, &xi)| t.value(xi)).sum()
    }

    pub fn solvers(&self) -> SolverSet {
        SolverSet::new(IntervalBound(self.clone()), LocalEvaluation(self.clone()))
    }
}

/// Lower bounder summing per-term interval bounds.
pub struct IntervalBound(pub Separable);

impl LowerBoundSolver for IntervalBound {
    fn solve(&mut self, node: &BabNode, _incumbent: f64) -> BabResult<LowerBoundOutcome> {
        let mut bound = 0.0;
        let mut point = Vec::with_capacity(node.dimension());
        for (i, term) in self.0.terms.iter().enumerate() {
            let (b, x) = term.bound(node.lower_bounds[i], node.upper_bounds[i]);
            bound += b;
            point.push(x);
        }
        Ok(LowerBoundOutcome::bound(bound, point))
    }
}

/// Upper bounder evaluating the objective at the (rounded) seed.
pub struct LocalEvaluation(pub Separable);

impl UpperBoundSolver for LocalEvaluation {
    fn solve(&mut self, node: &BabNode, seed: &[f64], incumbent: f64) -> BabResult<UpperBoundOutcome> {
        let point: Vec<f64> = self
            .0
            .terms
            .iter()
            .enumerate()
            .map(|(i, term)| term.local_point(seed[i], node.lower_bounds[i], node.upper_bounds[i]))
            .collect();
        let value = self.0.value(&point);
        Ok(UpperBoundOutcome::feasible(value, point, incumbent))
    }
}

/// Lower bounder that proves every box infeasible.
pub struct NothingFeasible;

impl LowerBoundSolver for NothingFeasible {
    fn solve(&mut self, _node: &BabNode, _incumbent: f64) -> BabResult<LowerBoundOutcome> {
        Ok(LowerBoundOutcome::infeasible())
    }
}

/// Wraps a lower bounder and fails once `budget` calls were made.
pub struct FailsAfter<L> {
    pub inner: L,
    pub budget: usize,
    pub calls: usize,
}

impl<L: LowerBoundSolver> LowerBoundSolver for FailsAfter<L> {
    fn solve(&mut self, node: &BabNode, incumbent: f64) -> BabResult<LowerBoundOutcome> {
        if self.calls >= self.budget {
            return Err(BabError::Collaborator("relaxation diverged".into()));
        }
        self.calls += 1;
        self.inner.solve(node, incumbent)
    }
}

/// Wraps a lower bounder and sleeps before every call.
pub struct Slow<L> {
    pub inner: L,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl<L: LowerBoundSolver> LowerBoundSolver for Slow<L> {
    fn solve(&mut self, node: &BabNode, incumbent: f64) -> BabResult<LowerBoundOutcome> {
        std::thread::sleep(self.delay);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.solve(node, incumbent)
    }
}

/// Upper bounder that never finds a point.
pub struct NoLocalSearch;

impl UpperBoundSolver for NoLocalSearch {
    fn solve(&mut self, _node: &BabNode, _seed: &[f64], _incumbent: f64) -> BabResult<UpperBoundOutcome> {
        Ok(UpperBoundOutcome::not_found())
    }
}

/// Upper bounder that always reports the same known point.
pub struct KnownPoint {
    pub problem: Separable,
    pub point: Vec<f64>,
}

impl UpperBoundSolver for KnownPoint {
    fn solve(&mut self, _node: &BabNode, _seed: &[f64], incumbent: f64) -> BabResult<UpperBoundOutcome> {
        let value = self.problem.value(&self.point);
        Ok(UpperBoundOutcome::feasible(value, self.point.clone(), incumbent))
    }
}

/// Wraps a lower bounder and records the incumbent it is called with.
pub struct Watch<L> {
    pub inner: L,
    pub seen: Arc<Mutex<Vec<f64>>>,
}

impl<L: LowerBoundSolver> LowerBoundSolver for Watch<L> {
    fn solve(&mut self, node: &BabNode, incumbent: f64) -> BabResult<LowerBoundOutcome> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(incumbent);
        }
        self.inner.solve(node, incumbent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quartic_bound_is_valid() {
        // Bounds must never exceed sampled values inside the box
        for (lb, ub) in [(-2.0, 2.0), (-1.5, -1.0), (0.3, 0.31), (1.0, 2.0)] {
            let bound = quartic_lower_bound(lb, ub);
            for k in 0..=100 {
                let x = lb + (ub - lb) * k as f64 / 100.0;
                assert!(bound <= quartic(x) + 1e-12);
            }
        }
    }
}
