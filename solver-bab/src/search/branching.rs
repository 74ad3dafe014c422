//! Branching: dimension selection, node splitting and pseudocost learning.

use std::collections::HashMap;

use super::{BabNode, BabNodeWithInfo, BabTree, BranchStatus, BranchingHistoryInfo, PseudocostTable};
use crate::error::{BabError, BabResult};
use crate::model::{OptimizationVariable, VariableType};
use crate::settings::{BranchingStrategy, NodeScoreFunction, NodeSelection};

/// Offset keeping untried directions from zeroing the product score.
const PSEUDOCOST_EPS: f64 = 1e-6;

/// Distances below this are treated as no movement.
const MIN_DELTA: f64 = 1e-12;

/// Slack allowed when rounding discrete bounds to integers.
const INTEGRALITY_TOL: f64 = 1e-9;

/// Product score rewarding improvement in both directions.
pub fn product_score(up: f64, down: f64) -> f64 {
    (up.max(down) + PSEUDOCOST_EPS) * (up.min(down) + PSEUDOCOST_EPS)
}

/// Result of `Brancher::branch_on_node`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BranchOutcome {
    /// Every dimension had zero width; the node was re-queued unchanged.
    pub is_fixed: bool,

    /// Every dimension was below the size tolerance; the node was dropped.
    pub can_be_treated_as_fixed: bool,

    /// Variable that was split, if any.
    pub branch_var: Option<usize>,

    /// Ids of the created children (down, up). Children may have been
    /// pruned on insertion.
    pub children: Vec<u64>,
}

/// Snapshot kept for a node handed out and not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WaitingEntry {
    pruning_score: f64,
    history: BranchingHistoryInfo,
}

/// Owns the open-node tree and decides how nodes are split.
///
/// Nodes leave through `get_next_node` and must be confirmed with
/// `register_node_change` (or cancelled with `discard_waiting_node`);
/// confirmation is where pseudocosts are learned.
#[derive(Debug, Clone)]
pub struct Brancher {
    /// Global variable list.
    variables: Vec<OptimizationVariable>,

    /// Open nodes.
    tree: BabTree,

    /// Learned pseudocosts.
    pseudocosts: PseudocostTable,

    /// Nodes handed out, keyed by id.
    waiting: HashMap<u64, WaitingEntry>,

    /// Branching dimension selection rule.
    strategy: BranchingStrategy,

    /// Selection score assigned at insertion.
    score_function: NodeScoreFunction,
}

impl Brancher {
    /// Create a brancher over the given variables.
    pub fn new(variables: Vec<OptimizationVariable>) -> BabResult<Self> {
        if variables.is_empty() {
            return Err(BabError::InvalidProblem("no variables".into()));
        }
        let variables = variables
            .into_iter()
            .map(OptimizationVariable::validated)
            .collect::<BabResult<Vec<_>>>()?;

        Ok(Self {
            pseudocosts: PseudocostTable::new(variables.len()),
            variables,
            tree: BabTree::new(NodeSelection::default()),
            waiting: HashMap::new(),
            strategy: BranchingStrategy::default(),
            score_function: NodeScoreFunction::default(),
        })
    }

    /// Validated global variables.
    pub fn variables(&self) -> &[OptimizationVariable] {
        &self.variables
    }

    /// Set the branching dimension selection rule.
    pub fn set_branching_dimension_selection_strategy(&mut self, strategy: BranchingStrategy) {
        self.strategy = strategy;
    }

    /// Active branching rule.
    pub fn branching_strategy(&self) -> BranchingStrategy {
        self.strategy
    }

    /// Set the selection score function used for future insertions.
    pub fn set_node_selection_score_function(&mut self, function: NodeScoreFunction) {
        self.score_function = function;
    }

    /// Set the tree's node selection strategy.
    pub fn set_node_selection_strategy(&mut self, strategy: NodeSelection) {
        self.tree.set_node_selection_strategy(strategy);
    }

    /// Set fathoming tolerances.
    pub fn enable_pruning_with_tolerance(&mut self, rel: f64, abs: f64) {
        self.tree.enable_pruning_with_tolerance(rel, abs);
    }

    /// Lower the pruning threshold; returns the lowest fathomed pruning score.
    pub fn decrease_pruning_score_threshold_to(&mut self, threshold: f64) -> f64 {
        self.tree.set_pruning_score_threshold(threshold)
    }

    /// Current pruning threshold.
    pub fn get_pruning_score_threshold(&self) -> f64 {
        self.tree.pruning_score_threshold()
    }

    /// Lowest pruning score among open nodes.
    pub fn get_lowest_pruning_score(&self) -> f64 {
        self.tree.get_lowest_pruning_score()
    }

    /// Threshold minus lowest open pruning score.
    pub fn get_pruning_score_gap(&self) -> f64 {
        self.tree.get_pruning_score_gap()
    }

    /// Number of open nodes.
    pub fn nodes_in_tree(&self) -> usize {
        self.tree.size()
    }

    /// Number of nodes handed out and not yet confirmed.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Read access to the tree.
    pub fn tree(&self) -> &BabTree {
        &self.tree
    }

    /// Learned pseudocosts.
    pub fn pseudocosts(&self) -> &PseudocostTable {
        &self.pseudocosts
    }

    /// Insert the root node with a zero selection score.
    pub fn insert_root_node(&mut self, node: BabNode) -> BabResult<bool> {
        self.check_dimension(&node)?;
        self.tree.reserve_ids_through(node.id);
        Ok(self.tree.add_node(BabNodeWithInfo::new(
            node,
            0.0,
            BranchingHistoryInfo::not_branched(),
        )))
    }

    /// Queue an already evaluated node, such as a kept strong-branching child.
    pub fn insert_node(&mut self, node: BabNode) -> BabResult<bool> {
        self.check_dimension(&node)?;
        self.tree.reserve_ids_through(node.id);
        let score = self.selection_score(&node);
        Ok(self.tree.add_node(BabNodeWithInfo::new(
            node,
            score,
            BranchingHistoryInfo::not_branched(),
        )))
    }

    /// Pop the next node and remember it until it is confirmed.
    pub fn get_next_node(&mut self) -> BabResult<BabNode> {
        let wrapped = self.tree.pop_next_node()?;
        self.waiting.insert(
            wrapped.id(),
            WaitingEntry {
                pruning_score: wrapped.pruning_score(),
                history: wrapped.history,
            },
        );
        Ok(wrapped.node)
    }

    /// Confirm a handed-out node and learn from its realized bound change.
    pub fn register_node_change(&mut self, id: u64, processed_node: &BabNode) -> BabResult<()> {
        let entry = self.waiting.remove(&id).ok_or(BabError::UnknownNodeId(id))?;
        let history = entry.history;
        let Some(var) = history.branch_var.filter(|_| history.is_branched()) else {
            return Ok(());
        };
        if var >= self.variables.len() {
            return Err(BabError::InvalidProblem(format!(
                "node {id} was branched on variable {var} of {}",
                self.variables.len()
            )));
        }

        let delta = self.realized_delta(var, &history);
        let original = entry.pruning_score;
        let threshold = self.tree.pruning_score_threshold();
        let realized = processed_node.pruning_score.min(threshold);

        if delta <= MIN_DELTA || !original.is_finite() || !realized.is_finite() {
            return Ok(());
        }

        let improvement = (realized - original).max(0.0);
        let gap = threshold - original;
        let gap = if gap.is_finite() && gap > 0.0 { gap } else { 1.0 };

        self.pseudocosts
            .record(var, history.branch_status, improvement / delta / gap);
        Ok(())
    }

    /// Cancel a handed-out node that will never be confirmed.
    pub fn discard_waiting_node(&mut self, id: u64) -> BabResult<()> {
        self.waiting
            .remove(&id)
            .map(|_| ())
            .ok_or(BabError::UnknownNodeId(id))
    }

    /// Split `parent` into two children and queue them.
    ///
    /// A node with every dimension fixed is re-queued unchanged; a node whose
    /// every relative width is within `rel_node_size_tol` is dropped.
    pub fn branch_on_node(
        &mut self,
        parent: BabNode,
        relaxation_point: &[f64],
        relaxation_obj_value: f64,
        rel_node_size_tol: f64,
    ) -> BabResult<BranchOutcome> {
        self.check_dimension(&parent)?;

        let mut parent = parent;
        self.round_discrete_bounds(&mut parent);
        if parent.is_empty_box() {
            log::debug!("Node {} holds no integer point, dropping it", parent.id);
            return Ok(BranchOutcome {
                can_be_treated_as_fixed: true,
                ..Default::default()
            });
        }

        if parent.is_fixed() {
            let score = self.selection_score(&parent);
            self.tree.add_node(BabNodeWithInfo::new(
                parent,
                score,
                BranchingHistoryInfo::not_branched(),
            ));
            return Ok(BranchOutcome {
                is_fixed: true,
                ..Default::default()
            });
        }

        if self.is_below_size_tolerance(&parent, rel_node_size_tol) {
            return Ok(BranchOutcome {
                can_be_treated_as_fixed: true,
                ..Default::default()
            });
        }

        let var = self
            .select_branching_dimension(&parent, relaxation_point)
            .ok_or_else(|| BabError::InvalidProblem(format!("node {} has no branchable dimension", parent.id)))?;

        if !relaxation_obj_value.is_nan() {
            parent.pruning_score = parent.pruning_score.max(relaxation_obj_value);
        }

        let (down, up) = self.split(&parent, var, relaxation_point);
        let children = vec![down.node.id, up.node.id];
        self.tree.add_node(down);
        self.tree.add_node(up);

        Ok(BranchOutcome {
            branch_var: Some(var),
            children,
            ..Default::default()
        })
    }

    /// Split `parent` on every branchable dimension without queuing anything.
    ///
    /// Each child is registered as handed out, so the caller must confirm it
    /// with `register_node_change` or cancel it with `discard_waiting_node`.
    pub fn get_all_nodes_from_strong_branching(
        &mut self,
        parent: &BabNode,
        relaxation_point: &[f64],
    ) -> BabResult<Vec<BabNode>> {
        self.check_dimension(parent)?;

        let mut parent = parent.clone();
        self.round_discrete_bounds(&mut parent);
        if parent.is_empty_box() {
            return Ok(Vec::new());
        }
        let parent = &parent;

        let mut nodes = Vec::with_capacity(2 * parent.dimension());
        for var in 0..parent.dimension() {
            if parent.width(var) <= 0.0 {
                continue;
            }
            let (down, up) = self.split(parent, var, relaxation_point);
            for child in [down, up] {
                self.waiting.insert(
                    child.id(),
                    WaitingEntry {
                        pruning_score: child.pruning_score(),
                        history: child.history,
                    },
                );
                nodes.push(child.node);
            }
        }
        Ok(nodes)
    }

    /// Choose the dimension to split according to the active strategy.
    pub fn select_branching_dimension(&self, node: &BabNode, relaxation_point: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;

        for (i, var) in self.variables.iter().enumerate() {
            let width = node.width(i);
            if width <= 0.0 {
                continue;
            }
            let priority = var.branching_priority();

            let score = match self.strategy {
                BranchingStrategy::Pseudocost => {
                    let (delta_minus, delta_plus) = self.selection_deltas(node, i, relaxation_point);
                    let est_down = self.pseudocosts.down_estimate(i) * delta_minus;
                    let est_up = self.pseudocosts.up_estimate(i) * delta_plus;
                    priority * product_score(est_up, est_down)
                }
                BranchingStrategy::AbsoluteDiameter => priority * width,
                BranchingStrategy::RelativeDiameter => {
                    let global = var.width();
                    if global <= 0.0 {
                        continue;
                    }
                    priority * width / global
                }
            };

            let replaces = match best {
                None => true,
                Some((_, best_score)) if self.strategy == BranchingStrategy::Pseudocost => score > best_score,
                Some((j, best_score)) if nearly_equal(score, best_score) => {
                    self.boundary_distance(node, i, relaxation_point)
                        > self.boundary_distance(node, j, relaxation_point)
                }
                Some((_, best_score)) => score > best_score,
            };
            if replaces {
                best = Some((i, score));
            }
        }

        best.map(|(i, _)| i)
    }

    /// Selection score of a node under the active score function.
    pub fn selection_score(&self, node: &BabNode) -> f64 {
        match self.score_function {
            NodeScoreFunction::LowPruningScoreFirst => -node.pruning_score,
            NodeScoreFunction::LowIdFirst => -(node.id as f64),
            NodeScoreFunction::HighIdFirst => node.id as f64,
        }
    }

    /// Shrink the bounds of discrete variables to the integers they contain.
    fn round_discrete_bounds(&self, node: &mut BabNode) {
        for (i, var) in self.variables.iter().enumerate() {
            if var.variable_type().is_discrete() {
                node.lower_bounds[i] = (node.lower_bounds[i] - INTEGRALITY_TOL).ceil();
                node.upper_bounds[i] = (node.upper_bounds[i] + INTEGRALITY_TOL).floor();
            }
        }
    }

    /// Build the down and up children of `parent` on `var`.
    ///
    /// Discrete bounds of `parent` must already be integral.
    fn split(
        &mut self,
        parent: &BabNode,
        var: usize,
        relaxation_point: &[f64],
    ) -> (BabNodeWithInfo, BabNodeWithInfo) {
        let lb = parent.lower_bounds[var];
        let ub = parent.upper_bounds[var];
        let point = parent.midpoint(var);
        let relaxation_value = self.relaxation_value(parent, var, relaxation_point);

        let (down_ub, up_lb) = if self.variables[var].variable_type().is_discrete() {
            (point.floor(), point.floor() + 1.0)
        } else {
            (point, point)
        };

        let mut down = self.child_of(parent);
        down.upper_bounds[var] = down_ub;
        let mut up = self.child_of(parent);
        up.lower_bounds[var] = up_lb;

        let down_history = BranchingHistoryInfo::branched(var, BranchStatus::BranchedDown, relaxation_value, lb, ub);
        let up_history = BranchingHistoryInfo::branched(var, BranchStatus::BranchedUp, relaxation_value, lb, ub);
        (self.wrap(down, down_history), self.wrap(up, up_history))
    }

    fn wrap(&self, node: BabNode, history: BranchingHistoryInfo) -> BabNodeWithInfo {
        let score = self.selection_score(&node);
        BabNodeWithInfo::new(node, score, history)
    }

    fn child_of(&mut self, parent: &BabNode) -> BabNode {
        let mut child = BabNode::new(
            parent.pruning_score,
            parent.lower_bounds.clone(),
            parent.upper_bounds.clone(),
            self.tree.get_valid_id(),
            parent.depth + 1,
        );
        child.dataset_index = parent.dataset_index;
        child
    }

    /// Relaxation value of `var`, or the midpoint if unavailable.
    fn relaxation_value(&self, node: &BabNode, var: usize, relaxation_point: &[f64]) -> f64 {
        match relaxation_point.get(var) {
            Some(&x) if x.is_finite() => x.clamp(node.lower_bounds[var], node.upper_bounds[var]),
            _ => node.midpoint(var),
        }
    }

    /// (delta_minus, delta_plus) of `var` for the node being branched.
    fn selection_deltas(&self, node: &BabNode, var: usize, relaxation_point: &[f64]) -> (f64, f64) {
        if self.variables[var].variable_type().is_discrete() {
            let x = self.relaxation_value(node, var, relaxation_point);
            let frac = x - x.floor();
            (frac, 1.0 - frac)
        } else {
            let point = node.midpoint(var);
            (node.upper_bounds[var] - point, point - node.lower_bounds[var])
        }
    }

    /// Distance used to normalize a realized improvement.
    fn realized_delta(&self, var: usize, history: &BranchingHistoryInfo) -> f64 {
        let (delta_minus, delta_plus) = match self.variables[var].variable_type() {
            VariableType::Continuous => {
                let point = 0.5 * (history.parent_lower_bound + history.parent_upper_bound);
                (history.parent_upper_bound - point, point - history.parent_lower_bound)
            }
            VariableType::Binary | VariableType::Integer => {
                let x = history.relaxation_point_at_branch_var;
                let frac = x - x.floor();
                (frac, 1.0 - frac)
            }
        };
        match history.branch_status {
            BranchStatus::BranchedDown => delta_minus,
            BranchStatus::BranchedUp => delta_plus,
            BranchStatus::NotBranched => 0.0,
        }
    }

    /// Normalized distance of the relaxation value to the nearer bound.
    fn boundary_distance(&self, node: &BabNode, var: usize, relaxation_point: &[f64]) -> f64 {
        let width = node.width(var);
        if width <= 0.0 {
            return 0.0;
        }
        let x = self.relaxation_value(node, var, relaxation_point);
        (x - node.lower_bounds[var]).min(node.upper_bounds[var] - x) / width
    }

    /// True if every width of `node` relative to the global box is within `rel_node_size_tol`.
    pub fn is_below_size_tolerance(&self, node: &BabNode, rel_node_size_tol: f64) -> bool {
        self.variables.iter().enumerate().all(|(i, var)| {
            let global = var.width();
            let relative = if global > 0.0 { node.width(i) / global } else { 0.0 };
            relative <= rel_node_size_tol
        })
    }

    fn check_dimension(&self, node: &BabNode) -> BabResult<()> {
        let n = self.variables.len();
        if node.lower_bounds.len() != n || node.upper_bounds.len() != n {
            return Err(BabError::InvalidProblem(format!(
                "node {} has dimension {}/{} but problem has {} variables",
                node.id,
                node.lower_bounds.len(),
                node.upper_bounds.len(),
                n
            )));
        }
        Ok(())
    }
}

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs())
}
