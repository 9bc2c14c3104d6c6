//! Bounded concurrency for CPU-heavy transforms.
//!
//! # Responsibilities
//! - Cap how many transforms run at once
//! - Bound how long a response waits for a slot
//! - Return the slot on every exit path (the permit is released on drop)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

/// Counting permit pool with a timed acquire.
///
/// Waiters are not queued fairly with respect to the timeout; a waiter that
/// gives up simply drops out.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait up to `timeout` for a free slot.
    ///
    /// Returns `None` when no slot became free in time.
    pub async fn acquire(&self, timeout: Duration) -> Option<TransformPermit> {
        match tokio::time::timeout(timeout, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                tracing::trace!(
                    available = self.slots.available_permits(),
                    capacity = self.capacity,
                    "Transform slot acquired"
                );
                Some(TransformPermit { _permit: permit })
            }
            // The semaphore is never closed, so an acquire error only means no slot
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

/// The right to run one transform.
///
/// Dropping it returns the slot to the pool, including on panic.
#[derive(Debug)]
pub struct TransformPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
