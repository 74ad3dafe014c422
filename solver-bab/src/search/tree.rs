//! Open-node storage for B&B tree exploration.

use std::cmp::Ordering;

use super::BabNodeWithInfo;
use crate::error::{BabError, BabResult};
use crate::settings::NodeSelection;

/// Priority structure holding every open node.
///
/// Nodes live in an arena of slots and never move while queued; the heap
/// is an array of slot indices ordered by the active selection strategy.
/// No stored node ever has a pruning score at or above the
/// tolerance-adjusted pruning threshold.
#[derive(Debug, Clone)]
pub struct BabTree {
    /// Node arena. `None` marks a free slot.
    slots: Vec<Option<BabNodeWithInfo>>,

    /// Free slot indices for reuse.
    free_slots: Vec<usize>,

    /// Slot indices, heap-ordered (root = next node to pop).
    heap: Vec<usize>,

    /// Node selection strategy.
    strategy: NodeSelection,

    /// Nodes at or above this (tolerance-adjusted) score are fathomed.
    pruning_score_threshold: f64,

    /// Relative fathoming tolerance.
    rel_pruning_tol: f64,

    /// Absolute fathoming tolerance.
    abs_pruning_tol: f64,

    /// Next id handed out by `get_valid_id`.
    next_id: u64,

    /// Lowest pruning score among nodes discarded on insertion (+inf if none).
    lowest_pruned_on_insert: f64,

    /// Count of stored nodes fathomed by threshold updates.
    nodes_fathomed_by_threshold: u64,
}

/// Apply fathoming tolerances to a threshold.
pub fn tolerance_adjusted(threshold: f64, rel: f64, abs: f64) -> f64 {
    if !threshold.is_finite() {
        return threshold;
    }
    threshold - abs.max(rel * threshold.abs())
}

impl Default for BabTree {
    fn default() -> Self {
        Self::new(NodeSelection::default())
    }
}

impl BabTree {
    /// Create an empty tree with the given strategy and no threshold.
    pub fn new(strategy: NodeSelection) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            heap: Vec::new(),
            strategy,
            pruning_score_threshold: f64::INFINITY,
            rel_pruning_tol: 0.0,
            abs_pruning_tol: 0.0,
            next_id: 1, // 0 reserved for root
            lowest_pruned_on_insert: f64::INFINITY,
            nodes_fathomed_by_threshold: 0,
        }
    }

    /// Add a node, unless its pruning score is at or above the adjusted threshold.
    ///
    /// Returns true if the node was stored.
    pub fn add_node(&mut self, node: BabNodeWithInfo) -> bool {
        if node.pruning_score() >= self.adjusted_threshold() {
            self.lowest_pruned_on_insert = self.lowest_pruned_on_insert.min(node.pruning_score());
            return false;
        }

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        self.heap.push(slot);
        let pos = self.heap.len() - 1;
        self.sift_up(pos);
        true
    }

    /// Remove and return the node chosen by the active strategy.
    pub fn pop_next_node(&mut self) -> BabResult<BabNodeWithInfo> {
        if self.heap.is_empty() {
            return Err(BabError::EmptyTree);
        }

        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let slot = self.heap.pop().ok_or(BabError::EmptyTree)?;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }

        let node = self.take_slot(slot)?;
        Ok(node)
    }

    /// Node that `pop_next_node` would return.
    pub fn peek_next_node(&self) -> Option<&BabNodeWithInfo> {
        self.heap.first().and_then(|&slot| self.slots[slot].as_ref())
    }

    /// Lowest pruning score over stored nodes (+inf if empty).
    pub fn get_lowest_pruning_score(&self) -> f64 {
        self.iter()
            .map(|n| n.pruning_score())
            .fold(f64::INFINITY, f64::min)
    }

    /// Threshold minus lowest pruning score (-inf if empty).
    pub fn get_pruning_score_gap(&self) -> f64 {
        if self.heap.is_empty() {
            return f64::NEG_INFINITY;
        }
        self.pruning_score_threshold - self.get_lowest_pruning_score()
    }

    /// Lower the pruning threshold and fathom every node it now dominates.
    ///
    /// A request to raise the threshold is ignored. Returns the lowest
    /// pruning score among fathomed nodes (+inf if none).
    pub fn set_pruning_score_threshold(&mut self, new_threshold: f64) -> f64 {
        if new_threshold.is_nan() || new_threshold > self.pruning_score_threshold {
            return f64::INFINITY;
        }
        self.pruning_score_threshold = new_threshold;

        let adjusted = self.adjusted_threshold();
        let mut lowest_fathomed = f64::INFINITY;
        let mut kept = Vec::with_capacity(self.heap.len());

        for slot in std::mem::take(&mut self.heap) {
            let score = self.slots[slot]
                .as_ref()
                .map_or(f64::INFINITY, |n| n.pruning_score());
            if score >= adjusted {
                self.slots[slot] = None;
                self.free_slots.push(slot);
                self.nodes_fathomed_by_threshold += 1;
                lowest_fathomed = lowest_fathomed.min(score);
            } else {
                kept.push(slot);
            }
        }

        self.heap = kept;
        self.make_heap();
        lowest_fathomed
    }

    /// Current (unadjusted) pruning threshold.
    pub fn pruning_score_threshold(&self) -> f64 {
        self.pruning_score_threshold
    }

    /// Threshold after applying the fathoming tolerances.
    ///
    /// `t - max(abs, rel * |t|)` for finite `t`; an infinite threshold is unchanged.
    pub fn adjusted_threshold(&self) -> f64 {
        tolerance_adjusted(self.pruning_score_threshold, self.rel_pruning_tol, self.abs_pruning_tol)
    }

    /// Set the fathoming slack used by future insertions and threshold updates.
    pub fn enable_pruning_with_tolerance(&mut self, rel: f64, abs: f64) {
        self.rel_pruning_tol = rel.max(0.0);
        self.abs_pruning_tol = abs.max(0.0);
    }

    /// Swap the selection strategy.
    ///
    /// Stored nodes keep their selection scores; only the order is rebuilt.
    pub fn set_node_selection_strategy(&mut self, strategy: NodeSelection) {
        if self.strategy != strategy {
            self.strategy = strategy;
            self.make_heap();
        }
    }

    /// Active selection strategy.
    pub fn node_selection_strategy(&self) -> NodeSelection {
        self.strategy
    }

    /// Hand out a fresh node id.
    pub fn get_valid_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Make sure future ids are strictly greater than `id`.
    pub fn reserve_ids_through(&mut self, id: u64) {
        self.next_id = self.next_id.max(id.saturating_add(1));
    }

    /// Number of stored nodes.
    pub fn size(&self) -> usize {
        self.heap.len()
    }

    /// Check if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Iterate over stored nodes in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &BabNodeWithInfo> {
        self.heap.iter().filter_map(move |&slot| self.slots[slot].as_ref())
    }

    /// Estimated memory held by stored nodes, in bytes.
    pub fn memory_footprint_bytes(&self) -> usize {
        let nodes: usize = self.iter().map(|n| n.node.memory_bytes()).sum();
        nodes
            + self.slots.capacity() * std::mem::size_of::<Option<BabNodeWithInfo>>()
            + (self.heap.capacity() + self.free_slots.capacity()) * std::mem::size_of::<usize>()
    }

    /// Lowest pruning score among nodes discarded on insertion (+inf if none).
    pub fn lowest_pruned_on_insert(&self) -> f64 {
        self.lowest_pruned_on_insert
    }

    /// Stored nodes fathomed by threshold updates.
    pub fn total_fathomed_by_threshold(&self) -> u64 {
        self.nodes_fathomed_by_threshold
    }

    fn take_slot(&mut self, slot: usize) -> BabResult<BabNodeWithInfo> {
        let node = self.slots[slot].take().ok_or(BabError::EmptyTree)?;
        self.free_slots.push(slot);
        Ok(node)
    }

    /// True if the node in slot `a` must be popped before the one in slot `b`.
    fn outranks(&self, a: usize, b: usize) -> bool {
        let (Some(na), Some(nb)) = (self.slots[a].as_ref(), self.slots[b].as_ref()) else {
            return false;
        };
        match self.strategy {
            NodeSelection::BestBound => match na.node_selection_score.total_cmp(&nb.node_selection_score) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => na.id() < nb.id(),
            },
            NodeSelection::DepthFirst => na.id() > nb.id(),
            NodeSelection::BreadthFirst => na.id() < nb.id(),
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.outranks(self.heap[pos], self.heap[parent]) {
                break;
            }
            self.heap.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut best = pos;

            if left < len && self.outranks(self.heap[left], self.heap[best]) {
                best = left;
            }
            if right < len && self.outranks(self.heap[right], self.heap[best]) {
                best = right;
            }
            if best == pos {
                break;
            }
            self.heap.swap(pos, best);
            pos = best;
        }
    }

    fn make_heap(&mut self) {
        for pos in (0..self.heap.len() / 2).rev() {
            self.sift_down(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{BabNode, BranchingHistoryInfo};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn node(id: u64, pruning_score: f64, selection_score: f64) -> BabNodeWithInfo {
        BabNodeWithInfo::new(
            BabNode::new(pruning_score, vec![0.0, 0.0], vec![1.0, 1.0], id, 0),
            selection_score,
            BranchingHistoryInfo::not_branched(),
        )
    }

    #[test]
    fn test_best_bound_selection() {
        let mut tree = BabTree::new(NodeSelection::BestBound);
        tree.add_node(node(1, 10.0, -10.0));
        tree.add_node(node(2, 5.0, -5.0));
        tree.add_node(node(3, 15.0, -15.0));

        assert_eq!(tree.get_lowest_pruning_score(), 5.0);

        // Highest selection score (lowest bound) comes first
        assert_eq!(tree.pop_next_node().unwrap().id(), 2);
        assert_eq!(tree.pop_next_node().unwrap().id(), 1);
        assert_eq!(tree.pop_next_node().unwrap().id(), 3);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_depth_and_breadth_first_selection() {
        let mut tree = BabTree::new(NodeSelection::DepthFirst);
        for id in [4, 9, 1, 7] {
            tree.add_node(node(id, 0.0, 0.0));
        }

        assert_eq!(tree.pop_next_node().unwrap().id(), 9);
        assert_eq!(tree.pop_next_node().unwrap().id(), 7);

        tree.set_node_selection_strategy(NodeSelection::BreadthFirst);
        assert_eq!(tree.pop_next_node().unwrap().id(), 1);
        assert_eq!(tree.pop_next_node().unwrap().id(), 4);
    }

    #[test]
    fn test_pop_empty_tree() {
        let mut tree = BabTree::default();
        assert_eq!(tree.pop_next_node().unwrap_err(), BabError::EmptyTree);
        assert_eq!(tree.get_lowest_pruning_score(), f64::INFINITY);
        assert_eq!(tree.get_pruning_score_gap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_single_node_round_trip_is_identical() {
        let mut tree = BabTree::default();
        let mut inserted = node(12, -3.25, 3.25);
        inserted.node.dataset_index = Some(4);
        inserted.node.augmented = true;
        inserted.history = BranchingHistoryInfo::branched(1, crate::search::BranchStatus::BranchedUp, 0.3, 0.0, 1.0);

        tree.add_node(inserted.clone());
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.pop_next_node().unwrap(), inserted);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let mut tree = BabTree::default();
        tree.add_node(node(1, 3.0, -3.0));
        tree.add_node(node(2, 6.0, -6.0));
        tree.add_node(node(3, 5.0, -5.0));

        let lowest_fathomed = tree.set_pruning_score_threshold(5.0);

        assert_eq!(lowest_fathomed, 5.0);
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.pop_next_node().unwrap().id(), 1);
        assert_eq!(tree.total_fathomed_by_threshold(), 2);
    }

    #[test]
    fn test_raising_threshold_is_noop() {
        let mut tree = BabTree::default();
        tree.set_pruning_score_threshold(5.0);
        tree.add_node(node(1, 4.0, -4.0));

        assert_eq!(tree.set_pruning_score_threshold(8.0), f64::INFINITY);
        assert_eq!(tree.pruning_score_threshold(), 5.0);
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.get_pruning_score_gap(), 1.0);
    }

    #[test]
    fn test_insertion_pruning_with_tolerance() {
        let mut tree = BabTree::default();
        tree.set_pruning_score_threshold(10.0);
        assert!(!tree.add_node(node(1, 10.0, 0.0)));

        // abs tol 0.5, rel tol 0.01 -> slack max(0.5, 0.1) = 0.5
        tree.enable_pruning_with_tolerance(0.01, 0.5);
        assert_eq!(tree.adjusted_threshold(), 9.5);
        assert!(!tree.add_node(node(2, 9.6, 0.0)));
        assert!(tree.add_node(node(3, 9.4, 0.0)));
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.lowest_pruned_on_insert(), 9.6);
    }

    #[test]
    fn test_infinite_threshold_ignores_tolerance() {
        let mut tree = BabTree::default();
        tree.enable_pruning_with_tolerance(0.5, 1.0);
        assert_eq!(tree.adjusted_threshold(), f64::INFINITY);
        assert!(tree.add_node(node(1, 1e300, 0.0)));
    }

    #[test]
    fn test_strategy_switch_keeps_scores() {
        let mut tree = BabTree::new(NodeSelection::BreadthFirst);
        tree.add_node(node(1, 0.0, -1.0));
        tree.add_node(node(2, 0.0, 5.0));

        tree.set_node_selection_strategy(NodeSelection::BestBound);
        let first = tree.pop_next_node().unwrap();
        assert_eq!(first.id(), 2);
        assert_eq!(first.node_selection_score, 5.0);
    }

    #[test]
    fn test_valid_ids_are_monotone() {
        let mut tree = BabTree::default();
        let a = tree.get_valid_id();
        let b = tree.get_valid_id();
        assert!(b > a);

        tree.reserve_ids_through(100);
        assert_eq!(tree.get_valid_id(), 101);
        tree.reserve_ids_through(5);
        assert_eq!(tree.get_valid_id(), 102);
    }

    #[test]
    fn test_random_sequences_keep_size_and_threshold_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        for strategy in [NodeSelection::BestBound, NodeSelection::DepthFirst, NodeSelection::BreadthFirst] {
            let mut tree = BabTree::new(strategy);
            let (mut adds, mut pops, mut pruned) = (0usize, 0usize, 0usize);
            let mut next_id = 1;

            for step in 0..500 {
                if rng.gen_bool(0.6) || tree.is_empty() {
                    let score: f64 = rng.gen_range(-50.0..50.0);
                    adds += 1;
                    if !tree.add_node(node(next_id, score, -score)) {
                        pruned += 1;
                    }
                    next_id += 1;
                } else {
                    let popped = tree.pop_next_node().unwrap();
                    assert!(popped.pruning_score() < tree.adjusted_threshold());
                    pops += 1;
                }

                if step % 97 == 0 {
                    let before = tree.size();
                    let t = tree.pruning_score_threshold().min(60.0) - rng.gen_range(0.0..10.0);
                    tree.set_pruning_score_threshold(t);
                    pruned += before - tree.size();
                }

                assert_eq!(tree.size(), adds - pops - pruned);
                assert!(tree.iter().all(|n| n.pruning_score() < tree.adjusted_threshold()));
            }
        }
    }

    #[test]
    fn test_best_bound_pops_are_non_increasing() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut tree = BabTree::new(NodeSelection::BestBound);
        for id in 1..=200 {
            let score: f64 = rng.gen_range(-100.0..100.0);
            tree.add_node(node(id, 0.0, score));
        }

        let mut last = f64::INFINITY;
        while let Ok(n) = tree.pop_next_node() {
            assert!(n.node_selection_score <= last);
            last = n.node_selection_score;
        }
    }
}
