use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::time::Instant;

/// Lock-free counters describing the engine's throughput.
///
/// Counters only ever grow; nothing is reset for the life of the process.
#[derive(Debug)]
pub struct MetricsRegistry {
    started_at: Instant,
    messages_received: AtomicU64,
    orders_processed: AtomicU64,
    orders_failed: AtomicU64,
    malformed_messages: AtomicU64,
    duplicate_deliveries: AtomicU64,
    ack_failures: AtomicU64,
    receive_errors: AtomicU64,
    orders_accepted: AtomicU64,
    active_workers: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub orders_processed: u64,
    pub orders_failed: u64,
    pub malformed_messages: u64,
    pub duplicate_deliveries: u64,
    pub ack_failures: u64,
    pub receive_errors: u64,
    pub orders_accepted: u64,
    pub workers_active: usize,
    pub uptime_seconds: f64,
    /// Processed orders per second since start.
    pub processing_rate: f64,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            orders_processed: AtomicU64::new(0),
            orders_failed: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            duplicate_deliveries: AtomicU64::new(0),
            ack_failures: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            orders_accepted: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.orders_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A malformed message also counts as a failed order.
    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
        self.record_failed();
    }

    pub fn record_duplicate(&self) {
        self.duplicate_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.orders_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Marks a worker as running until the returned guard is dropped.
    pub fn worker_started(self: &Arc<Self>) -> ActiveWorkerGuard {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
        ActiveWorkerGuard {
            metrics: Arc::clone(self),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.started_at.elapsed().as_secs_f64();
        let processed = self.orders_processed.load(Ordering::Relaxed);
        let processing_rate = if uptime > 0.0 {
            processed as f64 / uptime
        } else {
            0.0
        };

        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            orders_processed: processed,
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            duplicate_deliveries: self.duplicate_deliveries.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            orders_accepted: self.orders_accepted.load(Ordering::Relaxed),
            workers_active: self.active_workers(),
            uptime_seconds: uptime,
            processing_rate,
        }
    }
}

/// Decrements the active worker gauge when a worker exits, however it exits.
pub struct ActiveWorkerGuard {
    metrics: Arc<MetricsRegistry>,
}

impl Drop for ActiveWorkerGuard {
    fn drop(&mut self) {
        self.metrics.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}
