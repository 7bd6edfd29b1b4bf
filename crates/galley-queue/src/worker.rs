use crate::context::WorkContext;
use chrono::SecondsFormat;
use galley_core::{WorkItem, WorkerId};
use metrics::histogram;
use serde::Serialize;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// The run's token was cancelled at one of the worker's suspension points.
    Cancelled,
    /// The worker reached its item budget.
    BudgetExhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    /// Items produced or consumed, depending on the role.
    pub items: u64,
    pub exit: WorkerExit,
    /// Ids of consumed items, in consumption order. Only filled by consumers
    /// built with [`ConsumerWorker::with_item_log`].
    pub consumed: Vec<Uuid>,
}

pub trait Worker: Send + 'static {
    fn id(&self) -> WorkerId;

    /// Run the worker loop until cancellation or budget exhaustion.
    fn run(self, ctx: WorkContext<WorkItem>) -> WorkerReport;
}

/// Start `worker` on a dedicated OS thread named after its id.
pub fn spawn<W: Worker>(
    worker: W,
    ctx: WorkContext<WorkItem>,
) -> io::Result<JoinHandle<WorkerReport>> {
    thread::Builder::new()
        .name(worker.id().to_string())
        .spawn(move || worker.run(ctx))
}

fn budget_reached(budget: Option<u64>, done: u64) -> bool {
    budget.is_some_and(|limit| done >= limit)
}

/// Manufactures one item per `latency` and enqueues it.
#[derive(Debug, Clone)]
pub struct ProducerWorker {
    id: WorkerId,
    latency: Duration,
    budget: Option<u64>,
}

impl ProducerWorker {
    pub fn new(index: usize, latency: Duration) -> Self {
        Self {
            id: WorkerId::producer(index),
            latency,
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: Option<u64>) -> Self {
        self.budget = budget;
        self
    }
}

impl Worker for ProducerWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn run(self, ctx: WorkContext<WorkItem>) -> WorkerReport {
        let mut produced = 0u64;
        let exit = loop {
            if budget_reached(self.budget, produced) {
                break WorkerExit::BudgetExhausted;
            }
            if ctx.token().sleep(self.latency).is_err() {
                break WorkerExit::Cancelled;
            }

            let item = WorkItem::new(self.id, produced);
            let (sequence, created_at) = (item.sequence, item.created_at);
            if ctx.queue().put(item).is_err() {
                break WorkerExit::Cancelled;
            }
            produced += 1;
            info!(
                worker = %self.id,
                sequence,
                "{} {} served a dish",
                created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                self.id
            );
        };

        info!(worker = %self.id, produced, ?exit, "producer stopped");
        WorkerReport {
            id: self.id,
            items: produced,
            exit,
            consumed: Vec::new(),
        }
    }
}

/// Takes items off the queue and holds each for `latency` after releasing the
/// queue lock.
#[derive(Debug, Clone)]
pub struct ConsumerWorker {
    id: WorkerId,
    latency: Duration,
    budget: Option<u64>,
    item_log: bool,
}

impl ConsumerWorker {
    pub fn new(index: usize, latency: Duration) -> Self {
        Self {
            id: WorkerId::consumer(index),
            latency,
            budget: None,
            item_log: false,
        }
    }

    pub fn with_budget(mut self, budget: Option<u64>) -> Self {
        self.budget = budget;
        self
    }

    /// Keep the id of every consumed item in the report. Off by default since
    /// the list grows for as long as the worker runs.
    pub fn with_item_log(mut self, item_log: bool) -> Self {
        self.item_log = item_log;
        self
    }
}

impl Worker for ConsumerWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn run(self, ctx: WorkContext<WorkItem>) -> WorkerReport {
        let mut taken = 0u64;
        let mut consumed = Vec::new();
        let exit = loop {
            if budget_reached(self.budget, taken) {
                break WorkerExit::BudgetExhausted;
            }

            let item = match ctx.queue().take() {
                Ok(item) => item,
                Err(_) => break WorkerExit::Cancelled,
            };
            taken += 1;
            if self.item_log {
                consumed.push(item.id);
            }
            info!(
                worker = %self.id,
                from = %item.producer,
                "{} {} got a dish, eating...",
                chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                self.id
            );

            let started = Instant::now();
            let finished = ctx.token().sleep(self.latency);
            histogram!("galley_consume_time").record(started.elapsed());
            if finished.is_err() {
                debug!(worker = %self.id, "processing interrupted");
                break WorkerExit::Cancelled;
            }
        };

        info!(worker = %self.id, consumed = taken, ?exit, "consumer stopped");
        WorkerReport {
            id: self.id,
            items: taken,
            exit,
            consumed,
        }
    }
}
