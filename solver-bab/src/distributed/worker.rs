//! Worker side: processes nodes it is handed, never touches the tree.

use std::ops::ControlFlow;

use crossbeam::channel::{Receiver, Sender};

use super::protocol::{ManagerMessage, WorkerMessage};
use crate::bnb::{process_node, PruningCutoff, StatusTag};
use crate::oracle::SolverSet;

/// A worker owning its own collaborators and a local copy of the cutoff.
#[derive(Debug)]
pub struct Worker {
    index: usize,
    solvers: SolverSet,
    cutoff: PruningCutoff,
}

impl Worker {
    /// Create worker `index`.
    pub fn new(index: usize, solvers: SolverSet, cutoff: PruningCutoff) -> Self {
        Self { index, solvers, cutoff }
    }

    /// Incumbent value this worker currently prunes against.
    pub fn incumbent(&self) -> f64 {
        self.cutoff.incumbent
    }

    /// React to one manager message.
    ///
    /// Breaks on a status broadcast; otherwise continues with an optional
    /// reply.
    pub fn handle(&mut self, message: ManagerMessage) -> ControlFlow<StatusTag, Option<WorkerMessage>> {
        match message {
            ManagerMessage::Node(node) => {
                let id = node.id;
                let reply = match process_node(&mut self.solvers, node, self.cutoff) {
                    Ok(report) => {
                        if let Some(payload) = &report.new_incumbent {
                            self.cutoff.tighten(payload.objective_value);
                        }
                        WorkerMessage::Report(report)
                    }
                    Err(e) => {
                        log::warn!("Worker {}: node {id} failed: {e}", self.index);
                        WorkerMessage::Failed(e.to_string())
                    }
                };
                ControlFlow::Continue(Some(reply))
            }
            ManagerMessage::Incumbent(payload) => {
                self.cutoff.tighten(payload.objective_value);
                ControlFlow::Continue(None)
            }
            ManagerMessage::Status(tag) => ControlFlow::Break(tag),
        }
    }

    /// Serve messages until a status broadcast or until the manager hangs up.
    pub fn run(mut self, inbox: Receiver<ManagerMessage>, outbox: Sender<WorkerMessage>) {
        for message in inbox.iter() {
            match self.handle(message) {
                ControlFlow::Continue(Some(reply)) => {
                    if outbox.send(reply).is_err() {
                        log::warn!("Worker {}: manager disconnected", self.index);
                        return;
                    }
                }
                ControlFlow::Continue(None) => {}
                ControlFlow::Break(tag) => {
                    log::debug!("Worker {}: stopping on {tag:?}", self.index);
                    return;
                }
            }
        }
    }
}
