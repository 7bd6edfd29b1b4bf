use galley_core::{CancellationToken, GalleyError, Interrupt, Result};
use metrics::{counter, gauge};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Returned by [`SharedQueue::offer`] when a bounded queue is at capacity.
/// Hands the item back to the caller.
#[derive(Debug, Error)]
#[error("queue is full (capacity {capacity})")]
pub struct Rejected<T> {
    pub item: T,
    pub capacity: usize,
}

impl<T> From<Rejected<T>> for GalleyError {
    fn from(rejected: Rejected<T>) -> Self {
        GalleyError::QueueFull(rejected.capacity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct QueueStats {
    pub offered: u64,
    pub taken: u64,
    pub len: usize,
}

/// FIFO queue shared by any number of producers and consumers.
///
/// One mutex guards the sequence. Consumers park on `not_empty`, producers
/// blocked by a capacity bound park on `not_full`. Every enqueue wakes all
/// consumers; each re-checks the queue under the lock and the losers park
/// again.
///
/// The queue is bound to a [`CancellationToken`] at construction. Once the
/// token is cancelled every blocking call returns [`GalleyError::Cancelled`]
/// instead of waiting.
pub struct SharedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    // Signalled on every dequeue, for callers waiting on consumption progress.
    progress: Condvar,
    capacity: Option<usize>,
    token: CancellationToken,
    offered: AtomicU64,
    taken: AtomicU64,
}

impl<T> fmt::Debug for SharedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQueue")
            .field("capacity", &self.capacity)
            .field("offered", &self.offered.load(Ordering::Relaxed))
            .field("taken", &self.taken.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send + 'static> SharedQueue<T> {
    pub fn unbounded(token: &CancellationToken) -> Arc<Self> {
        Self::build(None, token)
    }

    pub fn bounded(capacity: usize, token: &CancellationToken) -> Result<Arc<Self>> {
        if capacity == 0 {
            return Err(GalleyError::InvalidOperation(
                "queue capacity must be > 0".to_string(),
            ));
        }
        Ok(Self::build(Some(capacity), token))
    }

    pub fn with_capacity(capacity: Option<usize>, token: &CancellationToken) -> Result<Arc<Self>> {
        match capacity {
            Some(capacity) => Self::bounded(capacity, token),
            None => Ok(Self::unbounded(token)),
        }
    }

    fn build(capacity: Option<usize>, token: &CancellationToken) -> Arc<Self> {
        let queue = Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            progress: Condvar::new(),
            capacity,
            token: token.clone(),
            offered: AtomicU64::new(0),
            taken: AtomicU64::new(0),
        });
        let listener: Weak<dyn Interrupt> = Arc::downgrade(&queue) as Weak<dyn Interrupt>;
        token.register(listener);
        queue
    }
}

impl<T> SharedQueue<T> {
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let len = self.items.lock().len();
        QueueStats {
            offered: self.offered.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            len,
        }
    }

    /// Append without blocking. Always succeeds on an unbounded queue.
    pub fn offer(&self, item: T) -> std::result::Result<(), Rejected<T>> {
        let mut items = self.items.lock();
        if let Some(capacity) = self.capacity {
            if items.len() >= capacity {
                return Err(Rejected { item, capacity });
            }
        }
        self.push_locked(&mut items, item);
        Ok(())
    }

    /// Append, waiting for room on a bounded queue.
    pub fn put(&self, item: T) -> Result<()> {
        let mut items = self.items.lock();
        if let Some(capacity) = self.capacity {
            while items.len() >= capacity {
                self.token.check()?;
                debug!(capacity, "queue full, producer waiting");
                self.not_full.wait(&mut items);
            }
        }
        self.push_locked(&mut items, item);
        Ok(())
    }

    /// Remove the head, waiting while the queue is empty.
    pub fn take(&self) -> Result<T> {
        let mut items = self.items.lock();
        loop {
            self.token.check()?;
            if let Some(item) = self.pop_locked(&mut items) {
                return Ok(item);
            }
            debug!("queue empty, consumer waiting");
            self.not_empty.wait(&mut items);
        }
    }

    /// Like [`take`](Self::take) but gives up with `Ok(None)` after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            self.token.check()?;
            if let Some(item) = self.pop_locked(&mut items) {
                return Ok(Some(item));
            }
            if self
                .not_empty
                .wait_until(&mut items, deadline)
                .timed_out()
            {
                self.token.check()?;
                return Ok(self.pop_locked(&mut items));
            }
        }
    }

    /// Block until at least `expected` items have been taken in total.
    /// Woken by each dequeue, so no polling interval is involved.
    pub fn wait_for_taken(&self, expected: u64) -> Result<()> {
        let mut items = self.items.lock();
        // `taken` only changes under the lock, so this check cannot race a dequeue.
        while self.taken.load(Ordering::Relaxed) < expected {
            self.token.check()?;
            self.progress.wait(&mut items);
        }
        Ok(())
    }

    pub fn try_take(&self) -> Option<T> {
        let mut items = self.items.lock();
        self.pop_locked(&mut items)
    }

    /// Remove everything still queued. Drained items are not counted as taken.
    pub fn drain(&self) -> Vec<T> {
        let mut items = self.items.lock();
        let drained: Vec<T> = items.drain(..).collect();
        gauge!("galley_queue_size").set(0.0);
        self.not_full.notify_all();
        drained
    }

    fn push_locked(&self, items: &mut MutexGuard<'_, VecDeque<T>>, item: T) {
        items.push_back(item);
        self.offered.fetch_add(1, Ordering::Relaxed);
        counter!("galley_items_offered").increment(1);
        gauge!("galley_queue_size").set(items.len() as f64);
        self.not_empty.notify_all();
    }

    fn pop_locked(&self, items: &mut MutexGuard<'_, VecDeque<T>>) -> Option<T> {
        let item = items.pop_front()?;
        self.taken.fetch_add(1, Ordering::Relaxed);
        counter!("galley_items_taken").increment(1);
        gauge!("galley_queue_size").set(items.len() as f64);
        if self.capacity.is_some() {
            self.not_full.notify_all();
        }
        self.progress.notify_all();
        Some(item)
    }
}

impl<T: Send> Interrupt for SharedQueue<T> {
    fn interrupt(&self) {
        let _items = self.items.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.progress.notify_all();
    }
}
