//! Search node representation.

use serde::{Deserialize, Serialize};

use crate::model::OptimizationVariable;

/// A node in the B&B search tree: a sub-box of the global variable box.
///
/// This is also the payload exchanged with workers, so it serializes with
/// `serde`. Note that JSON cannot carry non-finite floats; a root node with
/// a `-inf` pruning score needs a binary transport or a finite placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BabNode {
    /// Lower bound on the best objective attainable inside this box.
    pub pruning_score: f64,

    /// Current lower bounds, one per variable.
    pub lower_bounds: Vec<f64>,

    /// Current upper bounds, one per variable.
    pub upper_bounds: Vec<f64>,

    /// Index of the data subset this node is evaluated on, if any.
    pub dataset_index: Option<u32>,

    /// Unique node identifier.
    pub id: u64,

    /// Depth in the tree (0 for root).
    pub depth: u32,

    /// Whether the node was augmented beyond its dataset.
    pub augmented: bool,
}

impl BabNode {
    /// Create a node with the given box.
    pub fn new(pruning_score: f64, lower_bounds: Vec<f64>, upper_bounds: Vec<f64>, id: u64, depth: u32) -> Self {
        debug_assert_eq!(lower_bounds.len(), upper_bounds.len());
        Self {
            pruning_score,
            lower_bounds,
            upper_bounds,
            dataset_index: None,
            id,
            depth,
            augmented: false,
        }
    }

    /// Create the root node spanning the global box of `variables`.
    pub fn root(variables: &[OptimizationVariable]) -> Self {
        Self::new(
            f64::NEG_INFINITY,
            variables.iter().map(|v| v.lower_bound()).collect(),
            variables.iter().map(|v| v.upper_bound()).collect(),
            0,
            0,
        )
    }

    /// Number of variables.
    pub fn dimension(&self) -> usize {
        self.lower_bounds.len()
    }

    /// Width of dimension `i`.
    pub fn width(&self, i: usize) -> f64 {
        self.upper_bounds[i] - self.lower_bounds[i]
    }

    /// Midpoint of dimension `i`.
    pub fn midpoint(&self, i: usize) -> f64 {
        0.5 * (self.lower_bounds[i] + self.upper_bounds[i])
    }

    /// True if every dimension has zero width.
    pub fn is_fixed(&self) -> bool {
        self.lower_bounds
            .iter()
            .zip(&self.upper_bounds)
            .all(|(lb, ub)| lb == ub)
    }

    /// True if some dimension has an empty interval.
    pub fn is_empty_box(&self) -> bool {
        self.lower_bounds
            .iter()
            .zip(&self.upper_bounds)
            .any(|(lb, ub)| lb > ub)
    }

    /// Estimated heap memory held by this node in bytes.
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + (self.lower_bounds.capacity() + self.upper_bounds.capacity()) * std::mem::size_of::<f64>()
    }
}

/// Which side of a split a node lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BranchStatus {
    /// Upper child: the branching variable's lower bound was raised.
    BranchedUp,

    /// Lower child: the branching variable's upper bound was lowered.
    BranchedDown,

    /// The node was not created by a split.
    #[default]
    NotBranched,
}

/// How a node came out of its parent, consumed once by pseudocost learning.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BranchingHistoryInfo {
    /// Index of the branching variable (None if not branched).
    pub branch_var: Option<usize>,

    /// Direction of the split.
    pub branch_status: BranchStatus,

    /// Relaxation solution value of the branching variable in the parent.
    pub relaxation_point_at_branch_var: f64,

    /// Parent's lower bound of the branching variable.
    pub parent_lower_bound: f64,

    /// Parent's upper bound of the branching variable.
    pub parent_upper_bound: f64,
}

impl BranchingHistoryInfo {
    /// History for a node that was not produced by a split.
    pub fn not_branched() -> Self {
        Self::default()
    }

    /// History for a child of a split on `var`.
    pub fn branched(var: usize, status: BranchStatus, relaxation_value: f64, parent_lb: f64, parent_ub: f64) -> Self {
        Self {
            branch_var: Some(var),
            branch_status: status,
            relaxation_point_at_branch_var: relaxation_value,
            parent_lower_bound: parent_lb,
            parent_upper_bound: parent_ub,
        }
    }

    /// True if this records an actual split.
    pub fn is_branched(&self) -> bool {
        self.branch_var.is_some() && self.branch_status != BranchStatus::NotBranched
    }
}

/// A node as stored in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BabNodeWithInfo {
    /// The node itself.
    pub node: BabNode,

    /// Ordering heuristic, set when the node enters the tree.
    pub node_selection_score: f64,

    /// How the node was created.
    pub history: BranchingHistoryInfo,
}

impl BabNodeWithInfo {
    /// Wrap a node.
    pub fn new(node: BabNode, node_selection_score: f64, history: BranchingHistoryInfo) -> Self {
        Self {
            node,
            node_selection_score,
            history,
        }
    }

    /// Node id.
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Node pruning score.
    pub fn pruning_score(&self) -> f64 {
        self.node.pruning_score
    }
}
