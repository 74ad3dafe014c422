//! Minimize a one-dimensional multimodal function with a Lipschitz bound
//!
//! Run with: cargo run --release -p solver-bab --example box_minimize

use std::time::Instant;

use solver_bab::{
    BabNode, BabResult, BabSettings, BabSolution, BranchAndBound, DistributedBranchAndBound, LowerBoundOutcome,
    LowerBoundSolver, OptimizationVariable, SolverSet, UpperBoundOutcome, UpperBoundSolver,
};

/// f(x) = sin(3x) + 0.5x, |f'| <= 3.5
fn f(x: f64) -> f64 {
    (3.0 * x).sin() + 0.5 * x
}

const LIPSCHITZ: f64 = 3.5;

struct LipschitzBound;

impl LowerBoundSolver for LipschitzBound {
    fn solve(&mut self, node: &BabNode, _incumbent: f64) -> BabResult<LowerBoundOutcome> {
        let mid = 0.5 * (node.lower_bounds[0] + node.upper_bounds[0]);
        let radius = 0.5 * node.width(0);
        Ok(LowerBoundOutcome::bound(f(mid) - LIPSCHITZ * radius, vec![mid]))
    }
}

struct Evaluate;

impl UpperBoundSolver for Evaluate {
    fn solve(&mut self, _node: &BabNode, seed: &[f64], incumbent: f64) -> BabResult<UpperBoundOutcome> {
        Ok(UpperBoundOutcome::feasible(f(seed[0]), seed.to_vec(), incumbent))
    }
}

fn solvers() -> SolverSet {
    SolverSet::new(LipschitzBound, Evaluate)
}

fn main() -> anyhow::Result<()> {
    println!("=== Box Minimization ===\n");
    println!("min sin(3x) + 0.5x s.t. x in [-3, 3]\n");

    let variables = vec![OptimizationVariable::continuous(-3.0, 3.0, "x")];
    let settings = BabSettings::default().with_pruning_tol(1e-6, 1e-6);

    println!("--- Serial ---");
    let start = Instant::now();
    let sol = BranchAndBound::new(variables.clone(), solvers(), settings.clone()).solve()?;
    print_solution(&sol, start);

    println!("--- Distributed (4 workers) ---");
    let start = Instant::now();
    let sol = DistributedBranchAndBound::new(variables, settings.with_workers(4), |_| solvers()).solve()?;
    print_solution(&sol, start);

    Ok(())
}

fn print_solution(sol: &BabSolution, start: Instant) {
    println!("Status: {:?} ({:?})", sol.status, sol.termination);
    println!("Objective: {:.8}", sol.obj_val);
    println!("Solution: {:?}", sol.x);
    println!("Lower bound: {:.8}, gap: {:.2e}", sol.lower_bound, sol.gap);
    println!(
        "Nodes: {} processed, {} branched, {} fathomed",
        sol.stats.nodes_processed, sol.stats.nodes_branched, sol.stats.nodes_fathomed
    );
    println!("Time: {:.2}ms\n", start.elapsed().as_secs_f64() * 1000.0);
}
