//! Cooperative cancellation shared by every worker of a run.
//!
//! A [`CancellationToken`] is a one-way latch. Workers observe it at each
//! suspension point: latency sleeps go through [`CancellationToken::sleep`],
//! and blocking containers implement [`Interrupt`] and register with the token
//! so that their waiters are woken when the latch flips.

use crate::error::{GalleyError, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

/// Something with blocked waiters that must re-check the token when it is
/// cancelled.
///
/// Implementations must take the same lock their waiters check the token
/// under before notifying, otherwise a waiter that has checked the flag but
/// not yet parked misses the wakeup.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    // Also the lock that sleepers park on.
    listeners: Mutex<Vec<Weak<dyn Interrupt>>>,
    sleepers: Condvar,
}

#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been cancelled.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GalleyError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Flip the latch and wake everything parked on it. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let listeners: Vec<Arc<dyn Interrupt>> = {
            let mut guard = self.inner.listeners.lock();
            self.inner.sleepers.notify_all();
            guard.retain(|l| l.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };

        debug!(listeners = listeners.len(), "cancellation requested");
        for listener in listeners {
            listener.interrupt();
        }
    }

    /// Register a blocking container to be interrupted on cancel. The token
    /// only keeps a weak reference.
    pub fn register(&self, listener: Weak<dyn Interrupt>) {
        self.inner.listeners.lock().push(listener);
    }

    /// Sleep for `duration` unless cancelled first.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.listeners.lock();
        while !self.is_cancelled() {
            if self
                .inner
                .sleepers
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                drop(guard);
                return self.check();
            }
        }
        Err(GalleyError::Cancelled)
    }

    /// Park until the token is cancelled.
    pub fn wait(&self) {
        let mut guard = self.inner.listeners.lock();
        while !self.is_cancelled() {
            self.inner.sleepers.wait(&mut guard);
        }
    }
}
