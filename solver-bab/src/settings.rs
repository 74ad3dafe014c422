//! Configuration settings for the branch-and-bound search.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BabError, BabResult};

/// Node selection strategy for the B&B tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum NodeSelection {
    /// Select the node with the highest node selection score.
    #[default]
    BestBound,

    /// Select the most recently created node (highest id).
    DepthFirst,

    /// Select the oldest node (lowest id).
    BreadthFirst,
}

impl FromStr for NodeSelection {
    type Err = BabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_bound" | "bestbound" | "best" => Ok(Self::BestBound),
            "depth_first" | "depthfirst" | "dfs" => Ok(Self::DepthFirst),
            "breadth_first" | "breadthfirst" | "bfs" => Ok(Self::BreadthFirst),
            other => Err(BabError::UnknownStrategy(format!("node selection '{other}'"))),
        }
    }
}

/// Branching dimension selection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum BranchingStrategy {
    /// Largest `priority * (ub - lb)`.
    AbsoluteDiameter,

    /// Largest `priority * (ub - lb) / (global_ub - global_lb)`.
    RelativeDiameter,

    /// Product score over learned up/down pseudocost estimates.
    #[default]
    Pseudocost,
}

impl FromStr for BranchingStrategy {
    type Err = BabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absolute_diameter" | "absdiam" | "abs" => Ok(Self::AbsoluteDiameter),
            "relative_diameter" | "reldiam" | "rel" => Ok(Self::RelativeDiameter),
            "pseudocost" | "pseudo_cost" | "pseudocosts" => Ok(Self::Pseudocost),
            other => Err(BabError::UnknownStrategy(format!("branching strategy '{other}'"))),
        }
    }
}

/// Function assigning the node selection score when a node enters the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum NodeScoreFunction {
    /// Lowest pruning score wins (score = -pruning_score).
    #[default]
    LowPruningScoreFirst,

    /// Lowest id wins (score = -id).
    LowIdFirst,

    /// Highest id wins (score = id).
    HighIdFirst,
}

impl FromStr for NodeScoreFunction {
    type Err = BabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low_pruning_score_first" | "pruning_score" => Ok(Self::LowPruningScoreFirst),
            "low_id_first" | "low_id" => Ok(Self::LowIdFirst),
            "high_id_first" | "high_id" => Ok(Self::HighIdFirst),
            other => Err(BabError::UnknownStrategy(format!("node score function '{other}'"))),
        }
    }
}

/// Deserialize strategy enums through `FromStr`, so JSON accepts the same
/// names and aliases as the command line.
macro_rules! parse_from_string {
    ($($ty:ty),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = BabError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    )*};
}

parse_from_string!(NodeSelection, BranchingStrategy, NodeScoreFunction);

/// Settings fields holding a strategy name.
const STRATEGY_FIELDS: [&str; 3] = ["node_selection", "branching_strategy", "node_score"];

/// Branch-and-bound settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BabSettings {
    // === Termination criteria ===
    /// Maximum number of nodes to process.
    pub max_nodes: u64,

    /// Wall-clock limit in milliseconds (None = unlimited).
    pub time_limit_ms: Option<u64>,

    /// CPU-time limit in milliseconds, summed over all processes (None = unlimited).
    pub cpu_time_limit_ms: Option<u64>,

    /// Ceiling on the estimated memory held by open nodes (None = unlimited).
    pub max_tree_memory_bytes: Option<usize>,

    /// Stop once the lowest open pruning score reaches this value.
    pub target_lower_bound: Option<f64>,

    /// Stop once the incumbent objective reaches this value.
    pub target_upper_bound: Option<f64>,

    /// Absolute fathoming tolerance.
    /// A node is pruned when pruning_score >= incumbent - max(abs, rel * |incumbent|).
    pub abs_pruning_tol: f64,

    /// Relative fathoming tolerance.
    pub rel_pruning_tol: f64,

    // === Search strategy ===
    /// Node selection strategy.
    pub node_selection: NodeSelection,

    /// Branching dimension selection rule.
    pub branching_strategy: BranchingStrategy,

    /// Node selection score function.
    pub node_score: NodeScoreFunction,

    /// Nodes whose every width relative to the global box is at most this
    /// are dropped instead of branched.
    pub rel_node_size_tol: f64,

    /// Strong branching on nodes shallower than this depth (0 = off).
    /// Only honored by the serial coordinator.
    pub strong_branching_max_depth: usize,

    // === Distribution ===
    /// Number of worker threads for the distributed coordinator.
    pub num_workers: usize,

    /// Manager wake-up interval while waiting on workers, in milliseconds.
    pub sync_tick_ms: u64,

    /// How long to wait for in-flight workers after termination, in milliseconds.
    pub drain_timeout_ms: u64,

    // === Output ===
    /// Log progress information.
    pub verbose: bool,

    /// Log frequency (log every N processed nodes).
    pub log_freq: u64,
}

impl Default for BabSettings {
    fn default() -> Self {
        Self {
            // Termination
            max_nodes: 1_000_000,
            time_limit_ms: None,
            cpu_time_limit_ms: None,
            max_tree_memory_bytes: None,
            target_lower_bound: None,
            target_upper_bound: None,
            abs_pruning_tol: 1e-6,
            rel_pruning_tol: 1e-4,

            // Search
            node_selection: NodeSelection::default(),
            branching_strategy: BranchingStrategy::default(),
            node_score: NodeScoreFunction::default(),
            rel_node_size_tol: 0.0,
            strong_branching_max_depth: 0,

            // Distribution
            num_workers: 4,
            sync_tick_ms: 50,
            drain_timeout_ms: 1_000,

            // Output
            verbose: false,
            log_freq: 100,
        }
    }
}

impl BabSettings {
    /// Parse settings from JSON. Missing fields take their default values.
    ///
    /// An unrecognised strategy name is `UnknownStrategy`; any other
    /// malformed input is `InvalidSettings`.
    pub fn from_json_str(json: &str) -> BabResult<Self> {
        let malformed = |e: serde_json::Error| BabError::InvalidSettings(format!("malformed settings JSON: {e}"));
        let value: serde_json::Value = serde_json::from_str(json).map_err(malformed)?;

        for field in STRATEGY_FIELDS {
            if let Some(name) = value.get(field).and_then(serde_json::Value::as_str) {
                match field {
                    "node_selection" => name.parse::<NodeSelection>().map(drop)?,
                    "branching_strategy" => name.parse::<BranchingStrategy>().map(drop)?,
                    _ => name.parse::<NodeScoreFunction>().map(drop)?,
                }
            }
        }

        let settings: Self = serde_json::from_value(value).map_err(malformed)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Set time limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_ms = Some((seconds * 1000.0) as u64);
        self
    }

    /// Set maximum nodes.
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set both fathoming tolerances.
    pub fn with_pruning_tol(mut self, rel: f64, abs: f64) -> Self {
        self.rel_pruning_tol = rel;
        self.abs_pruning_tol = abs;
        self
    }

    /// Set the node selection strategy.
    pub fn with_node_selection(mut self, strategy: NodeSelection) -> Self {
        self.node_selection = strategy;
        self
    }

    /// Set the branching strategy.
    pub fn with_branching_strategy(mut self, strategy: BranchingStrategy) -> Self {
        self.branching_strategy = strategy;
        self
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Check settings for consistency.
    pub fn validate(&self) -> BabResult<()> {
        let tolerances = [
            ("abs_pruning_tol", self.abs_pruning_tol),
            ("rel_pruning_tol", self.rel_pruning_tol),
            ("rel_node_size_tol", self.rel_node_size_tol),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value < 0.0 {
                return Err(BabError::InvalidSettings(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.rel_node_size_tol > 1.0 {
            return Err(BabError::InvalidSettings(format!(
                "rel_node_size_tol must be at most 1, got {}",
                self.rel_node_size_tol
            )));
        }
        if self.log_freq == 0 {
            return Err(BabError::InvalidSettings("log_freq must be positive".into()));
        }
        for (name, target) in [
            ("target_lower_bound", self.target_lower_bound),
            ("target_upper_bound", self.target_upper_bound),
        ] {
            if matches!(target, Some(t) if t.is_nan()) {
                return Err(BabError::InvalidSettings(format!("{name} is NaN")));
            }
        }
        Ok(())
    }
}
