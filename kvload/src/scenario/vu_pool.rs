use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Bounded pool of virtual users.
///
/// A VU is held for the lifetime of one iteration. Only the scenario loop acquires, so peak
/// tracking needs no synchronization; releases happen from any task as [`Vu`]s drop.
pub(crate) struct VuPool {
    permits: Arc<Semaphore>,
    preallocated: usize,
    max: usize,
    peak: usize,
    grown: bool,
}

/// An acquired VU, returned to the pool on drop.
pub(crate) struct Vu {
    _permit: OwnedSemaphorePermit,
}

impl VuPool {
    pub fn new(preallocated: usize, max: usize) -> Self {
        let max = max.max(preallocated).clamp(1, Semaphore::MAX_PERMITS);
        let preallocated = preallocated.clamp(1, max);
        Self {
            permits: Arc::new(Semaphore::new(max)),
            preallocated,
            max,
            peak: 0,
            grown: false,
        }
    }

    /// Never waits; `None` when every VU is busy.
    pub fn try_acquire(&mut self) -> Option<Vu> {
        let permit = self.permits.clone().try_acquire_owned().ok()?;

        let active = self.active();
        if active > self.peak {
            self.peak = active;

            if active > self.preallocated && !self.grown {
                self.grown = true;
                warn!(
                    "Insufficient preallocated VUs ({}), growing the pool towards {}",
                    self.preallocated, self.max
                );
            }
        }

        Some(Vu { _permit: permit })
    }

    pub fn active(&self) -> usize {
        self.max - self.permits.available_permits()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }
}
