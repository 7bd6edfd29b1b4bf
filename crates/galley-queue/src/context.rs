use crate::queue::{QueueStats, SharedQueue};
use galley_core::{CancellationToken, Result};
use std::sync::Arc;

/// What every worker of a run shares: the queue and the token that stops it.
pub struct WorkContext<T> {
    queue: Arc<SharedQueue<T>>,
    token: CancellationToken,
}

impl<T> Clone for WorkContext<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T: Send + 'static> WorkContext<T> {
    pub fn new(capacity: Option<usize>) -> Result<Self> {
        let token = CancellationToken::new();
        let queue = SharedQueue::with_capacity(capacity, &token)?;
        Ok(Self { queue, token })
    }

    pub fn unbounded() -> Self {
        let token = CancellationToken::new();
        let queue = SharedQueue::unbounded(&token);
        Self { queue, token }
    }
}

impl<T> WorkContext<T> {
    pub fn queue(&self) -> &Arc<SharedQueue<T>> {
        &self.queue
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Block until at least `expected` items have been taken from the queue.
    /// Fails with `Cancelled` if the run stops first.
    pub fn wait_for_taken(&self, expected: u64) -> Result<()> {
        self.queue.wait_for_taken(expected)
    }
}
