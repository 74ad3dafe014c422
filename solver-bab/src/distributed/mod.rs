//! Manager/worker form of the search.
//!
//! One manager thread owns every tree operation. Workers run node
//! processing on their own collaborators and talk to the manager only by
//! message passing, one channel pair per worker.

mod manager;
pub mod protocol;
mod worker;

pub use manager::DistributedBranchAndBound;
pub use protocol::{ManagerMessage, WorkerMessage};
pub use worker::Worker;
