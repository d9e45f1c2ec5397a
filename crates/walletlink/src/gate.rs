use crate::error::GateClosed;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Capacity-1 permit shared by every orchestration in the process.
///
/// Waiters are served in FIFO order (tokio's semaphore is fair), so sustained
/// contention cannot starve anyone. Cloning shares the same permit.
#[derive(Clone)]
pub struct SingleFlightGate {
    semaphore: Arc<Semaphore>,
    holders: Arc<AtomicUsize>,
}

impl Default for SingleFlightGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlightGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            holders: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Suspends until the permit is free.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        let previous = self.holders.fetch_add(1, Ordering::SeqCst);
        debug_assert_eq!(previous, 0, "single-flight gate handed out a second permit");
        Ok(GatePermit {
            _permit: permit,
            holders: self.holders.clone(),
        })
    }

    /// Number of current holders; always 0 or 1.
    pub fn holders(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }

    /// Refuse all current and future waiters. The current holder is unaffected.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// Proof of holding the gate. Released exactly once: explicitly through
/// [`GatePermit::release`] or implicitly on drop.
#[must_use = "dropping the permit releases the gate immediately"]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    holders: Arc<AtomicUsize>,
}

impl GatePermit {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so the count reaches zero before
        // the next waiter can observe the gate as free.
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }
}
