//! Stream concurrency limit.
//!
//! Streams beyond the limit wait for a permit instead of being rejected.
//! Closing the pool releases every waiter with `None`.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many streams are processed at once.
#[derive(Debug, Clone)]
pub struct StreamPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held for the lifetime of a stream. Dropping it frees the slot.
#[derive(Debug)]
pub struct StreamPermit {
    _permit: OwnedSemaphorePermit,
}

impl StreamPool {
    /// Creates a pool with `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot. Returns `None` once the pool is closed.
    pub async fn acquire(&self) -> Option<StreamPermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| StreamPermit { _permit: permit })
    }

    /// Stops handing out permits. Waiting and future callers get `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of streams currently holding a slot.
    #[must_use]
    pub fn active(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }
}
