//! Tree-side state of a search, shared by the serial and distributed coordinators.

use std::collections::HashSet;
use std::time::Instant;

use super::limits::{resource_limit, ResourceUsage};
use super::{FathomReason, IncumbentPayload, NodeReport, NodeState, PruningCutoff};
use crate::error::{BabError, BabResult};
use crate::model::{BabSolution, BabStatus, IncumbentTracker, OptimizationVariable, SearchStats, Termination};
use crate::search::{BabNode, Brancher};
use crate::settings::BabSettings;

/// Everything the coordinator owns: the brancher (and through it the tree
/// and pseudocosts), the incumbent, counters and resource usage.
#[derive(Debug)]
pub struct SearchContext {
    /// Node storage and branching.
    pub brancher: Brancher,

    /// Best known point.
    pub incumbent: IncumbentTracker,

    /// Search counters.
    pub stats: SearchStats,

    /// Time accounting.
    pub usage: ResourceUsage,

    settings: BabSettings,

    /// Ids of fixed nodes already re-queued once.
    requeued_fixed: HashSet<u64>,

    /// Lowest pruning score of any node discarded without being resolved:
    /// fathomed within the tolerance band or dropped as too small.
    best_fathomed_bound: f64,
}

impl SearchContext {
    /// Validate the settings, build the brancher and insert the root node.
    pub fn new(variables: Vec<OptimizationVariable>, settings: BabSettings) -> BabResult<Self> {
        settings.validate()?;

        let mut brancher = Brancher::new(variables)?;
        brancher.set_branching_dimension_selection_strategy(settings.branching_strategy);
        brancher.set_node_selection_strategy(settings.node_selection);
        brancher.set_node_selection_score_function(settings.node_score);
        brancher.enable_pruning_with_tolerance(settings.rel_pruning_tol, settings.abs_pruning_tol);

        let root = BabNode::root(brancher.variables());
        brancher.insert_root_node(root)?;

        Ok(Self {
            brancher,
            incumbent: IncumbentTracker::new(),
            stats: SearchStats::default(),
            usage: ResourceUsage::start(),
            settings,
            requeued_fixed: HashSet::new(),
            best_fathomed_bound: f64::INFINITY,
        })
    }

    /// Settings of this search.
    pub fn settings(&self) -> &BabSettings {
        &self.settings
    }

    /// Cutoff handed to node processing.
    pub fn cutoff(&self) -> PruningCutoff {
        PruningCutoff {
            incumbent: self.incumbent.obj_val,
            rel_tol: self.settings.rel_pruning_tol,
            abs_tol: self.settings.abs_pruning_tol,
        }
    }

    /// Pop the next node to process.
    pub fn next_node(&mut self) -> BabResult<BabNode> {
        let started = Instant::now();
        let node = self.brancher.get_next_node();
        self.usage.add_manager_time(started.elapsed());
        node
    }

    /// Offer a feasible point. On improvement the pruning threshold is lowered.
    ///
    /// Returns true if the incumbent changed.
    pub fn offer_incumbent(&mut self, payload: &IncumbentPayload) -> bool {
        if !self.incumbent.update(&payload.point, payload.objective_value) {
            return false;
        }
        self.stats.incumbent_updates += 1;

        let fathomed_before = self.brancher.tree().total_fathomed_by_threshold();
        let lowest_fathomed = self.brancher.decrease_pruning_score_threshold_to(payload.objective_value);
        self.note_discarded_bound(lowest_fathomed);
        let pruned = self.brancher.tree().total_fathomed_by_threshold() - fathomed_before;
        self.stats.nodes_pruned_by_threshold += pruned;

        log::info!(
            "New incumbent: obj={:.6e}, pruned {} nodes",
            payload.objective_value,
            pruned
        );
        true
    }

    /// Fold a processing report back into the tree.
    ///
    /// Confirms the node with the brancher, then branches it if processing
    /// left it open. Returns the node's final state.
    pub fn apply_report(&mut self, report: NodeReport) -> BabResult<NodeState> {
        let started = Instant::now();
        self.record(&report)?;
        let state = self.settle(report)?;
        self.usage.add_manager_time(started.elapsed());
        Ok(state)
    }

    /// Account a report and confirm its node with the brancher, without
    /// acting on its final state.
    pub fn record(&mut self, report: &NodeReport) -> BabResult<()> {
        self.usage.add_processing_time(report.busy);

        self.stats.nodes_processed += 1;
        self.stats.lbp_calls += report.lbp_calls;
        self.stats.ubp_calls += report.ubp_calls;
        self.stats.max_depth = self.stats.max_depth.max(report.node.depth);

        if let Some(payload) = &report.new_incumbent {
            self.offer_incumbent(payload);
        }

        self.brancher.register_node_change(report.node.id, &report.node)
    }

    /// Act on a recorded report: count fathomed nodes, branch open ones.
    pub fn settle(&mut self, report: NodeReport) -> BabResult<NodeState> {
        let id = report.node.id;
        let state = match report.state {
            NodeState::Fathomed(reason) => {
                self.count_fathomed(&report);
                NodeState::Fathomed(reason)
            }
            NodeState::Postprocessed => self.branch(report)?,
            other => {
                return Err(BabError::InvalidProblem(format!(
                    "node {id} reported in non-terminal state {other:?}"
                )))
            }
        };

        log::debug!("Node {id}: {state:?}");
        Ok(state)
    }

    /// Count a fathomed report. A value-dominated node keeps its bound for
    /// the final gap.
    pub fn count_fathomed(&mut self, report: &NodeReport) {
        self.stats.nodes_fathomed += 1;
        if report.state == NodeState::Fathomed(FathomReason::ValueDominated) {
            self.note_discarded_bound(report.node.pruning_score);
        }
    }

    fn note_discarded_bound(&mut self, pruning_score: f64) {
        if !pruning_score.is_nan() {
            self.best_fathomed_bound = self.best_fathomed_bound.min(pruning_score);
        }
    }

    /// Lowest bound over every part of the box not yet proven: open nodes,
    /// nodes in flight and nodes discarded inside the tolerance band.
    pub fn proven_lower_bound(&self, in_flight_lowest: Option<f64>) -> f64 {
        self.lowest_open_bound(in_flight_lowest)
            .min(self.best_fathomed_bound)
            .min(self.brancher.tree().lowest_pruned_on_insert())
    }

    fn branch(&mut self, report: NodeReport) -> BabResult<NodeState> {
        let id = report.node.id;
        let pruning_score = report.node.pruning_score;
        if report.node.is_fixed() && self.requeued_fixed.contains(&id) {
            self.stats.nodes_fathomed += 1;
            return Ok(NodeState::Fathomed(FathomReason::FixedPointEvaluated));
        }

        let outcome = self.brancher.branch_on_node(
            report.node,
            &report.lbp_point,
            report.lower_bound,
            self.settings.rel_node_size_tol,
        )?;

        if outcome.is_fixed {
            self.requeued_fixed.insert(id);
            self.stats.nodes_fixed += 1;
            Ok(NodeState::Fixed)
        } else if outcome.can_be_treated_as_fixed {
            self.stats.nodes_dropped += 1;
            self.note_discarded_bound(pruning_score);
            Ok(NodeState::Dropped)
        } else {
            self.stats.nodes_branched += 1;
            Ok(NodeState::Branched)
        }
    }

    /// Lowest pruning score over open and in-flight nodes.
    pub fn lowest_open_bound(&self, in_flight_lowest: Option<f64>) -> f64 {
        let open = self.brancher.get_lowest_pruning_score();
        in_flight_lowest.map_or(open, |pending| open.min(pending))
    }

    /// Decide whether the search is over.
    ///
    /// `in_flight_lowest` is the lowest pruning score among dispatched nodes
    /// that have not reported back (None if there are none). Checked in
    /// order: tree exhausted, target upper bound, target lower bound,
    /// resource ceilings.
    pub fn check_termination(&self, in_flight_lowest: Option<f64>) -> Option<BabStatus> {
        if self.brancher.nodes_in_tree() == 0 && in_flight_lowest.is_none() {
            return Some(self.exhausted_status());
        }

        if let Some(target) = self.settings.target_upper_bound {
            if self.incumbent.obj_val <= target {
                return Some(BabStatus::TargetUpperBoundReached);
            }
        }

        if let Some(target) = self.settings.target_lower_bound {
            if self.lowest_open_bound(in_flight_lowest) >= target {
                return Some(BabStatus::TargetLowerBoundReached);
            }
        }

        resource_limit(
            &self.settings,
            &self.stats,
            &self.usage,
            self.brancher.tree().memory_footprint_bytes(),
        )
    }

    /// Status of an exhausted tree.
    pub fn exhausted_status(&self) -> BabStatus {
        if self.incumbent.has_incumbent() {
            BabStatus::GloballyOptimal
        } else {
            BabStatus::Infeasible
        }
    }

    /// Log progress (if verbose).
    pub fn log_progress(&self) {
        if !self.settings.verbose {
            return;
        }

        if self.stats.nodes_processed % self.settings.log_freq != 0 {
            return;
        }

        let lowest = self.proven_lower_bound(None);
        log::info!(
            "Nodes: {} ({} open) | Bound: {:.6e} | Incumbent: {:.6e} | Gap: {:.3e} | Time: {:.1}s",
            self.stats.nodes_processed,
            self.brancher.nodes_in_tree(),
            lowest,
            self.incumbent.obj_val,
            BabSolution::compute_gap(self.incumbent.obj_val, lowest),
            self.usage.elapsed().as_secs_f64(),
        );
    }

    /// Build the final result.
    pub fn solution(&self, status: BabStatus, termination: Termination, error: Option<String>) -> BabSolution {
        let lowest = self.proven_lower_bound(None);

        if self.settings.verbose {
            log::info!(
                "Search finished: {:?} after {} nodes, incumbent {:.6e}",
                status,
                self.stats.nodes_processed,
                self.incumbent.obj_val
            );
        }

        BabSolution {
            status,
            termination,
            x: self.incumbent.solution.clone().unwrap_or_default(),
            obj_val: self.incumbent.obj_val,
            lower_bound: lowest.min(self.incumbent.obj_val),
            gap: BabSolution::compute_gap(self.incumbent.obj_val, lowest),
            stats: self.stats.clone(),
            wall_time: self.usage.elapsed(),
            error,
        }
    }
}
