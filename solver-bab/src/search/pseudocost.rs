//! Pseudocost statistics.

use super::BranchStatus;

/// Per-variable running averages of normalized bound improvement, one per
/// branching direction, with their trial counters.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudocostTable {
    /// Average improvement per unit when branching up.
    up: Vec<f64>,

    /// Average improvement per unit when branching down.
    down: Vec<f64>,

    /// Number of samples folded into `up`.
    trials_up: Vec<u64>,

    /// Number of samples folded into `down`.
    trials_down: Vec<u64>,
}

impl PseudocostTable {
    /// Create a zeroed table for `num_vars` variables.
    pub fn new(num_vars: usize) -> Self {
        Self {
            up: vec![0.0; num_vars],
            down: vec![0.0; num_vars],
            trials_up: vec![0; num_vars],
            trials_down: vec![0; num_vars],
        }
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.up.len()
    }

    /// Fold a sample into the running average for `var` in `direction`.
    ///
    /// Returns false (and records nothing) for `NotBranched`.
    pub fn record(&mut self, var: usize, direction: BranchStatus, sample: f64) -> bool {
        let (avg, trials) = match direction {
            BranchStatus::BranchedUp => (&mut self.up[var], &mut self.trials_up[var]),
            BranchStatus::BranchedDown => (&mut self.down[var], &mut self.trials_down[var]),
            BranchStatus::NotBranched => return false,
        };
        let k = *trials as f64;
        *avg = (k * *avg + sample) / (k + 1.0);
        *trials += 1;
        true
    }

    /// Average upward pseudocost of `var`.
    pub fn up(&self, var: usize) -> f64 {
        self.up[var]
    }

    /// Average downward pseudocost of `var`.
    pub fn down(&self, var: usize) -> f64 {
        self.down[var]
    }

    /// Number of upward samples of `var`.
    pub fn trials_up(&self, var: usize) -> u64 {
        self.trials_up[var]
    }

    /// Number of downward samples of `var`.
    pub fn trials_down(&self, var: usize) -> u64 {
        self.trials_down[var]
    }

    /// Upward pseudocost of `var` for selection.
    ///
    /// An untried direction borrows the average over tried variables.
    pub fn up_estimate(&self, var: usize) -> f64 {
        estimate(&self.up, &self.trials_up, var)
    }

    /// Downward pseudocost of `var` for selection.
    pub fn down_estimate(&self, var: usize) -> f64 {
        estimate(&self.down, &self.trials_down, var)
    }
}

fn estimate(averages: &[f64], trials: &[u64], var: usize) -> f64 {
    if trials[var] > 0 {
        return averages[var];
    }
    let (sum, count) = averages
        .iter()
        .zip(trials)
        .filter(|&(_, &k)| k > 0)
        .fold((0.0, 0usize), |(sum, count), (avg, _)| (sum + avg, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
