use crate::context::WorkContext;
use crate::queue::QueueStats;
use crate::worker::{self, ConsumerWorker, ProducerWorker, WorkerReport};
use galley_core::{GalleyError, Result, SimulationConfig, WorkItem, WorkerId, WorkerRole};
use serde::Serialize;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub workers: Vec<WorkerReport>,
    pub produced: u64,
    pub consumed: u64,
    /// Items still queued when the run stopped.
    pub leftover: usize,
    pub elapsed: Duration,
}

/// A running set of producer and consumer threads around one queue.
///
/// Dropping a simulation without calling [`shutdown`](Self::shutdown) still
/// cancels and joins its workers.
pub struct Simulation {
    ctx: WorkContext<WorkItem>,
    handles: Vec<(WorkerId, JoinHandle<WorkerReport>)>,
    started: Instant,
}

impl Simulation {
    pub fn start(config: &SimulationConfig) -> Result<Self> {
        Self::start_with_item_log(config, false)
    }

    /// Like [`start`](Self::start), with consumers recording the id of every
    /// item they take (see [`ConsumerWorker::with_item_log`]).
    pub fn start_with_item_log(config: &SimulationConfig, item_log: bool) -> Result<Self> {
        let ctx = WorkContext::new(config.capacity)?;
        let mut sim = Self {
            ctx,
            handles: Vec::with_capacity(config.producers + config.consumers),
            started: Instant::now(),
        };

        for index in 1..=config.producers {
            let producer = ProducerWorker::new(index, config.production_latency())
                .with_budget(config.items_per_producer);
            sim.launch(producer)?;
        }
        for index in 1..=config.consumers {
            let consumer = ConsumerWorker::new(index, config.consumption_latency())
                .with_item_log(item_log);
            sim.launch(consumer)?;
        }

        info!(
            producers = config.producers,
            consumers = config.consumers,
            capacity = ?config.capacity,
            "simulation started"
        );
        Ok(sim)
    }

    // On spawn failure `sim` is dropped by the caller's `?`, which stops the
    // workers already launched.
    fn launch<W: worker::Worker>(&mut self, worker: W) -> Result<()> {
        let id = worker.id();
        let handle = worker::spawn(worker, self.ctx.clone())?;
        self.handles.push((id, handle));
        Ok(())
    }

    pub fn context(&self) -> &WorkContext<WorkItem> {
        &self.ctx
    }

    pub fn stats(&self) -> QueueStats {
        self.ctx.stats()
    }

    pub fn producers_finished(&self) -> bool {
        self.handles
            .iter()
            .filter(|(id, _)| id.role == WorkerRole::Producer)
            .all(|(_, handle)| handle.is_finished())
    }

    /// Cancel the run, join every worker and report.
    pub fn shutdown(mut self) -> Result<SimulationReport> {
        self.ctx.cancel();
        let (workers, panicked) = self.join_all();

        let leftover = self.ctx.queue().drain().len();
        if leftover > 0 {
            warn!(leftover, "items left unconsumed at shutdown");
        }
        if !panicked.is_empty() {
            return Err(GalleyError::WorkerPanicked(panicked.join(", ")));
        }

        let sum = |role: WorkerRole| -> u64 {
            workers
                .iter()
                .filter(|r| r.id.role == role)
                .map(|r| r.items)
                .sum()
        };
        let report = SimulationReport {
            produced: sum(WorkerRole::Producer),
            consumed: sum(WorkerRole::Consumer),
            leftover,
            elapsed: self.started.elapsed(),
            workers,
        };
        info!(
            produced = report.produced,
            consumed = report.consumed,
            leftover = report.leftover,
            "simulation stopped"
        );
        Ok(report)
    }

    fn join_all(&mut self) -> (Vec<WorkerReport>, Vec<String>) {
        let mut reports = Vec::with_capacity(self.handles.len());
        let mut panicked = Vec::new();
        for (id, handle) in self.handles.drain(..) {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    error!(worker = %id, "worker thread panicked");
                    panicked.push(id.to_string());
                }
            }
        }
        (reports, panicked)
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.ctx.cancel();
            self.join_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            producers: 1,
            consumers: 1,
            production_latency_ms: 1,
            consumption_latency_ms: 1,
            items_per_producer: Some(4),
            capacity: None,
            run_for_secs: None,
        }
    }

    #[test]
    fn shutdown_reports_every_worker() {
        let sim = Simulation::start(&fast_config()).unwrap();
        sim.context().wait_for_taken(4).unwrap();
        assert_eq!(sim.stats().offered, 4);

        let report = sim.shutdown().unwrap();
        assert_eq!(report.workers.len(), 2);
        assert_eq!(report.produced, 4);
        assert_eq!(report.consumed, 4);
        assert_eq!(report.leftover, 0);
    }

    #[test]
    fn shutdown_without_consumers_progress_drains_leftovers() {
        let config = SimulationConfig {
            consumption_latency_ms: 60_000,
            items_per_producer: Some(3),
            ..fast_config()
        };
        let sim = Simulation::start(&config).unwrap();
        while !sim.producers_finished() {
            std::thread::sleep(Duration::from_millis(2));
        }

        let report = sim.shutdown().unwrap();
        assert_eq!(report.produced, 3);
        assert_eq!(report.consumed as usize + report.leftover, 3);
    }

    #[test]
    fn dropping_a_simulation_stops_it() {
        let config = SimulationConfig {
            items_per_producer: None,
            ..fast_config()
        };
        let sim = Simulation::start(&config).unwrap();
        let ctx = sim.context().clone();
        drop(sim);
        assert!(ctx.is_cancelled());
    }
}
