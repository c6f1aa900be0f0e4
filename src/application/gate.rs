use crate::error::{EngineError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct GateInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquired: AtomicU64,
    released: AtomicU64,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// Bounded-concurrency limiter for the downstream payment operation.
///
/// Capacity is independent of how many workers exist: with a capacity of one
/// every verification in the process runs strictly one after another, however
/// large the pool is.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

/// One held unit of gate capacity. Dropping it releases the slot.
pub struct AdmissionSlot {
    inner: Arc<GateInner>,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub capacity: usize,
    pub in_use: usize,
    pub acquired: u64,
    pub released: u64,
    pub peak_in_use: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EngineError::Config(
                "admission gate capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
                in_use: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        })
    }

    /// Waits, without timeout, until a slot is free.
    pub async fn acquire(&self) -> Result<AdmissionSlot> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::GateClosed)?;

        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        let now_in_use = self.inner.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak.fetch_max(now_in_use, Ordering::AcqRel);

        Ok(AdmissionSlot {
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            capacity: self.inner.capacity,
            in_use: self.inner.in_use.load(Ordering::Acquire),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            peak_in_use: self.inner.peak.load(Ordering::Acquire),
        }
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.inner.in_use.fetch_sub(1, Ordering::AcqRel);
        self.inner.released.fetch_add(1, Ordering::Relaxed);
    }
}
