//! Single-process coordinator.

use super::{process_node, NodeReport, NodeState, SearchContext};
use crate::error::BabResult;
use crate::model::{BabSolution, BabStatus, OptimizationVariable, Termination};
use crate::oracle::SolverSet;
use crate::search::product_score;
use crate::settings::BabSettings;

/// Branch-and-bound driver running every step in the calling thread.
#[derive(Debug)]
pub struct BranchAndBound {
    variables: Vec<OptimizationVariable>,
    solvers: SolverSet,
    settings: BabSettings,
}

impl BranchAndBound {
    /// Create a driver over `variables` using the given collaborators.
    pub fn new(variables: Vec<OptimizationVariable>, solvers: SolverSet, settings: BabSettings) -> Self {
        Self {
            variables,
            solvers,
            settings,
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> &BabSettings {
        &self.settings
    }

    /// Run the search.
    ///
    /// Invalid variables or settings are returned as `Err`. A collaborator
    /// failure during the search ends it with `BabStatus::Failed` and the
    /// best point found so far.
    pub fn solve(&mut self) -> BabResult<BabSolution> {
        let mut ctx = SearchContext::new(self.variables.clone(), self.settings.clone())?;

        if self.settings.verbose {
            log::info!(
                "Branch-and-bound: {} variables, {:?} selection, {:?} branching",
                self.variables.len(),
                self.settings.node_selection,
                self.settings.branching_strategy
            );
        }

        match self.search(&mut ctx) {
            Ok(status) => Ok(ctx.solution(status, Termination::Terminated, None)),
            Err(e) => {
                log::warn!("Search aborted: {e}");
                Ok(ctx.solution(BabStatus::Failed, Termination::Terminated, Some(e.to_string())))
            }
        }
    }

    fn search(&mut self, ctx: &mut SearchContext) -> BabResult<BabStatus> {
        loop {
            if let Some(status) = ctx.check_termination(None) {
                return Ok(status);
            }

            let node = ctx.next_node()?;
            let depth = node.depth as usize;
            let report = process_node(&mut self.solvers, node, ctx.cutoff())?;

            if depth < self.settings.strong_branching_max_depth && self.wants_strong_branching(ctx, &report) {
                self.strong_branch(ctx, report)?;
            } else {
                ctx.apply_report(report)?;
            }
            ctx.log_progress();
        }
    }

    fn wants_strong_branching(&self, ctx: &SearchContext, report: &NodeReport) -> bool {
        report.needs_branching()
            && !report.node.is_fixed()
            && !ctx
                .brancher
                .is_below_size_tolerance(&report.node, self.settings.rel_node_size_tol)
    }

    /// Evaluate the children of every split of `report.node` and keep the
    /// split whose child pair scores best.
    ///
    /// Every child is confirmed with the brancher, so all of them feed the
    /// pseudocosts. Open children of the kept split are queued; the others
    /// are abandoned.
    fn strong_branch(&mut self, ctx: &mut SearchContext, report: NodeReport) -> BabResult<NodeState> {
        ctx.record(&report)?;
        let parent = report.node;
        let parent_score = parent.pruning_score;

        let candidates = ctx
            .brancher
            .get_all_nodes_from_strong_branching(&parent, &report.lbp_point)?;

        let mut evaluated = Vec::with_capacity(candidates.len());
        for child in candidates {
            let child_report = process_node(&mut self.solvers, child, ctx.cutoff())?;
            ctx.record(&child_report)?;
            evaluated.push(child_report);
        }

        let threshold = ctx.brancher.get_pruning_score_threshold();
        let gain = |r: &NodeReport| (r.node.pruning_score.min(threshold) - parent_score).max(0.0);

        let mut best: Option<(usize, f64)> = None;
        for (pair, children) in evaluated.chunks(2).enumerate() {
            let [down, up] = children else { continue };
            let score = product_score(gain(up), gain(down));
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((pair, score));
            }
        }

        let Some((kept, _)) = best else {
            ctx.stats.nodes_dropped += 1;
            return Ok(NodeState::Dropped);
        };

        for (index, child) in evaluated.into_iter().enumerate() {
            if index / 2 != kept {
                continue;
            }
            match child.state {
                NodeState::Postprocessed => {
                    ctx.brancher.insert_node(child.node)?;
                }
                _ => ctx.count_fathomed(&child),
            }
        }

        ctx.stats.nodes_branched += 1;
        log::debug!("Node {}: strong branching kept split {kept}", parent.id);
        Ok(NodeState::Branched)
    }
}
