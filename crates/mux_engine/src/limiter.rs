use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Caps the number of fetches in flight. Waiters are admitted in FIFO order.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// An occupied slot; dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// A ceiling of zero is raised to one so admission can always progress.
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Waits for a free slot. Returns `None` if `cancel` has fired, even when
    /// a slot frees up at the same moment.
    pub async fn admit(&self, cancel: &CancellationToken) -> Option<Admission> {
        let semaphore = self.semaphore.clone();
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = semaphore.acquire_owned() => permit.ok()?,
        };
        if cancel.is_cancelled() {
            return None;
        }
        Some(Admission { _permit: permit })
    }
}
