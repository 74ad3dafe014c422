//! Manager side: owns the tree and hands nodes to workers.

use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Select, Sender};

use super::protocol::{ManagerMessage, StatusTag, WorkerMessage};
use super::worker::Worker;
use crate::bnb::{IncumbentPayload, SearchContext};
use crate::error::{BabError, BabResult};
use crate::model::{BabSolution, BabStatus, OptimizationVariable, Termination};
use crate::oracle::SolverSet;
use crate::search::BabNode;
use crate::settings::BabSettings;

/// Branch-and-bound with node processing spread over worker threads.
///
/// The manager alone mutates the tree. Each worker gets its own
/// `SolverSet` from `factory` and at most one node at a time.
pub struct DistributedBranchAndBound<F>
where
    F: Fn(usize) -> SolverSet + Sync,
{
    variables: Vec<OptimizationVariable>,
    settings: BabSettings,
    factory: F,
}

impl<F> DistributedBranchAndBound<F>
where
    F: Fn(usize) -> SolverSet + Sync,
{
    /// Create a driver. `factory(i)` builds the collaborators of worker `i`.
    pub fn new(variables: Vec<OptimizationVariable>, settings: BabSettings, factory: F) -> Self {
        Self {
            variables,
            settings,
            factory,
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> &BabSettings {
        &self.settings
    }

    /// Run the search on `settings.num_workers` worker threads.
    pub fn solve(&self) -> BabResult<BabSolution> {
        if self.settings.num_workers == 0 {
            return Err(BabError::InvalidSettings("num_workers must be positive".into()));
        }
        let mut ctx = SearchContext::new(self.variables.clone(), self.settings.clone())?;
        let cutoff = ctx.cutoff();

        if self.settings.verbose {
            log::info!(
                "Distributed branch-and-bound: {} variables, {} workers",
                self.variables.len(),
                self.settings.num_workers
            );
        }

        let (result, termination) = std::thread::scope(|scope| {
            let mut links = Vec::with_capacity(self.settings.num_workers);
            let mut handles = Vec::with_capacity(self.settings.num_workers);

            for index in 0..self.settings.num_workers {
                let (to_worker, inbox) = channel::unbounded();
                let (outbox, from_worker) = channel::unbounded();
                let factory = &self.factory;
                handles.push(scope.spawn(move || Worker::new(index, factory(index), cutoff).run(inbox, outbox)));
                links.push(WorkerLink::new(to_worker, from_worker));
            }

            let mut manager = Manager {
                ctx: &mut ctx,
                links,
                settings: &self.settings,
            };
            let outcome = manager.run_to_completion();
            drop(manager);

            for (index, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    log::warn!("Worker {index} panicked");
                }
            }
            outcome
        });

        Ok(match result {
            Ok(status) => ctx.solution(status, termination, None),
            Err(e) => ctx.solution(BabStatus::Failed, termination, Some(e.to_string())),
        })
    }
}

/// Manager end of one worker's channels.
struct WorkerLink {
    sender: Sender<ManagerMessage>,
    receiver: Receiver<WorkerMessage>,

    /// Node dispatched and not yet reported.
    in_flight: Option<BabNode>,
}

impl WorkerLink {
    fn new(sender: Sender<ManagerMessage>, receiver: Receiver<WorkerMessage>) -> Self {
        Self {
            sender,
            receiver,
            in_flight: None,
        }
    }
}

enum Wake {
    Tick,
    Message(usize, WorkerMessage),
    Disconnected(usize),
}

struct Manager<'a> {
    ctx: &'a mut SearchContext,
    links: Vec<WorkerLink>,
    settings: &'a BabSettings,
}

impl Manager<'_> {
    /// Search, drain and shut workers down.
    fn run_to_completion(&mut self) -> (BabResult<BabStatus>, Termination) {
        match self.run() {
            Ok(status) => {
                let termination = self.drain();
                self.broadcast_status(StatusTag::EverythingFine);
                (Ok(status), termination)
            }
            Err(e) => {
                log::warn!("Distributed search aborted: {e}");
                self.broadcast_status(StatusTag::Exception);
                let termination = if self.in_flight_count() > 0 {
                    Termination::TerminatedWorkersActive
                } else {
                    Termination::Terminated
                };
                (Err(e), termination)
            }
        }
    }

    fn run(&mut self) -> BabResult<BabStatus> {
        let ticker = channel::tick(Duration::from_millis(self.settings.sync_tick_ms.max(1)));

        loop {
            if let Some(status) = self.ctx.check_termination(self.in_flight_lowest()) {
                return Ok(status);
            }

            self.dispatch()?;
            if self.in_flight_count() == 0 {
                continue;
            }

            match self.wait(Some(&ticker), None) {
                Some(Wake::Tick) | None => {}
                Some(Wake::Message(worker, message)) => self.handle(worker, message)?,
                Some(Wake::Disconnected(worker)) => {
                    return Err(BabError::ChannelClosed(format!("worker {worker} disconnected")));
                }
            }
        }
    }

    /// Hand a node to every idle worker while the tree has nodes.
    fn dispatch(&mut self) -> BabResult<()> {
        for index in 0..self.links.len() {
            if self.links[index].in_flight.is_some() {
                continue;
            }
            if self.ctx.brancher.nodes_in_tree() == 0 {
                break;
            }

            let node = self.ctx.next_node()?;
            log::debug!("Dispatching node {} to worker {index}", node.id);
            self.links[index]
                .sender
                .send(ManagerMessage::Node(node.clone()))
                .map_err(|_| BabError::ChannelClosed(format!("worker {index} disconnected")))?;
            self.links[index].in_flight = Some(node);
        }
        Ok(())
    }

    /// Block until a busy worker replies, the ticker fires or the deadline passes.
    fn wait(&self, ticker: Option<&Receiver<Instant>>, deadline: Option<Instant>) -> Option<Wake> {
        let busy: Vec<usize> = (0..self.links.len())
            .filter(|&i| self.links[i].in_flight.is_some())
            .collect();

        let mut select = Select::new();
        for &i in &busy {
            select.recv(&self.links[i].receiver);
        }
        let tick_index = ticker.map(|t| select.recv(t));

        let op = match deadline {
            Some(deadline) => select.select_deadline(deadline).ok()?,
            None => select.select(),
        };

        let index = op.index();
        if Some(index) == tick_index {
            let _ = ticker.map(|t| op.recv(t));
            return Some(Wake::Tick);
        }

        let worker = busy[index];
        Some(match op.recv(&self.links[worker].receiver) {
            Ok(message) => Wake::Message(worker, message),
            Err(_) => Wake::Disconnected(worker),
        })
    }

    fn handle(&mut self, worker: usize, message: WorkerMessage) -> BabResult<()> {
        match message {
            WorkerMessage::Report(report) => {
                let expected = self.links[worker].in_flight.take().map(|n| n.id);
                if expected != Some(report.node.id) {
                    return Err(BabError::Protocol(format!(
                        "worker {worker} reported node {} but was processing {expected:?}",
                        report.node.id
                    )));
                }

                let before = self.ctx.incumbent.obj_val;
                self.ctx.apply_report(report)?;
                if self.ctx.incumbent.obj_val < before {
                    self.broadcast_incumbent()?;
                }
                self.ctx.log_progress();
                Ok(())
            }
            WorkerMessage::Failed(message) => Err(BabError::WorkerFailed { worker, message }),
        }
    }

    /// Collect late results until nothing is in flight or the drain window closes.
    ///
    /// Late reports are folded into the tree, so their incumbents and
    /// children count. Nodes still out when the window closes go back into
    /// the tree unprocessed.
    fn drain(&mut self) -> Termination {
        let deadline = Instant::now() + Duration::from_millis(self.settings.drain_timeout_ms);

        while self.in_flight_count() > 0 {
            match self.wait(None, Some(deadline)) {
                Some(Wake::Message(worker, WorkerMessage::Report(report))) => {
                    if let Err(e) = self.handle(worker, WorkerMessage::Report(report)) {
                        log::warn!("Dropping late report from worker {worker}: {e}");
                    }
                }
                Some(Wake::Message(worker, WorkerMessage::Failed(message))) => {
                    log::warn!("Worker {worker} failed while draining: {message}");
                    self.requeue(worker);
                }
                Some(Wake::Disconnected(worker)) => {
                    log::warn!("Worker {worker} disconnected while draining");
                    self.requeue(worker);
                }
                Some(Wake::Tick) => {}
                None => break,
            }
        }

        let pending = self.in_flight_count();
        if pending == 0 {
            return Termination::Terminated;
        }

        log::warn!("Drain timed out with {pending} nodes in flight");
        for worker in 0..self.links.len() {
            self.requeue(worker);
        }
        Termination::TerminatedWorkersActive
    }

    /// Put a worker's in-flight node back into the tree and cancel its waiting entry.
    fn requeue(&mut self, worker: usize) {
        let Some(node) = self.links[worker].in_flight.take() else {
            return;
        };
        let id = node.id;
        let restored = self
            .ctx
            .brancher
            .discard_waiting_node(id)
            .and_then(|()| self.ctx.brancher.insert_node(node));
        match restored {
            Ok(_) => log::warn!("Discarded waiting node {id}, returned it to the tree"),
            Err(e) => log::warn!("Could not return node {id} to the tree: {e}"),
        }
    }

    fn broadcast_incumbent(&self) -> BabResult<()> {
        let Some(point) = self.ctx.incumbent.solution.clone() else {
            return Ok(());
        };
        let payload = IncumbentPayload {
            objective_value: self.ctx.incumbent.obj_val,
            point,
        };
        for (index, link) in self.links.iter().enumerate() {
            link.sender
                .send(ManagerMessage::Incumbent(payload.clone()))
                .map_err(|_| BabError::ChannelClosed(format!("worker {index} disconnected")))?;
        }
        Ok(())
    }

    fn broadcast_status(&self, tag: StatusTag) {
        for (index, link) in self.links.iter().enumerate() {
            if link.sender.send(ManagerMessage::Status(tag)).is_err() {
                log::debug!("Worker {index} already gone");
            }
        }
    }

    fn in_flight_count(&self) -> usize {
        self.links.iter().filter(|l| l.in_flight.is_some()).count()
    }

    fn in_flight_lowest(&self) -> Option<f64> {
        self.links
            .iter()
            .filter_map(|l| l.in_flight.as_ref().map(|n| n.pruning_score))
            .reduce(f64::min)
    }
}

impl<F> std::fmt::Debug for DistributedBranchAndBound<F>
where
    F: Fn(usize) -> SolverSet + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedBranchAndBound")
            .field("variables", &self.variables.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
