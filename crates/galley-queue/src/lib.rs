//! Producer/consumer work queue for Galley
//!
//! - `queue`: monitor-style shared FIFO (one mutex, signal-all condition variables)
//! - `context`: the queue plus the cancellation token handed to every worker
//! - `worker`: producer and consumer loops running on dedicated threads
//! - `simulation`: starts, stops and reports on a set of workers

pub mod context;
pub mod queue;
pub mod simulation;
pub mod worker;

pub use context::WorkContext;
pub use queue::{QueueStats, Rejected, SharedQueue};
pub use simulation::{Simulation, SimulationReport};
pub use worker::{spawn, ConsumerWorker, ProducerWorker, Worker, WorkerExit, WorkerReport};
