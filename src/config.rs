use crate::application::pool::{ReceiveSettings, WorkerLimits};
use crate::error::{EngineError, Result};
use crate::infrastructure::memory_queue::QueueSettings;
use clap::Parser;
use std::time::Duration;

/// Largest batch a single receive may request.
pub const MAX_RECEIVE_BATCH: usize = 10;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Queue-driven order processing engine", long_about = None)]
pub struct Config {
    /// Port for the administrative HTTP surface
    #[arg(long, env = "PORT", default_value_t = 8081)]
    pub port: u16,

    /// Workers started at boot
    #[arg(long, env = "WORKER_COUNT", default_value_t = 1)]
    pub workers: usize,

    /// Smallest worker count a scale request may ask for
    #[arg(long, env = "MIN_WORKERS", default_value_t = 1)]
    pub min_workers: usize,

    /// Largest worker count a scale request may ask for
    #[arg(long, env = "MAX_WORKERS", default_value_t = 100)]
    pub max_workers: usize,

    /// Payment verifications allowed to run at the same time
    #[arg(long, env = "PAYMENT_CONCURRENCY", default_value_t = 1)]
    pub payment_concurrency: usize,

    /// Time one payment verification takes, in milliseconds
    #[arg(long, env = "PAYMENT_LATENCY_MS", default_value_t = 3000)]
    pub payment_latency_ms: u64,

    /// Fraction of payments declined, between 0 and 1
    #[arg(long, env = "PAYMENT_FAILURE_RATE", default_value_t = 0.01)]
    pub payment_failure_rate: f64,

    /// Messages requested per receive (1 to 10)
    #[arg(long, env = "RECEIVE_BATCH_SIZE", default_value_t = 10)]
    pub receive_batch_size: usize,

    /// Long-poll wait per receive, in seconds
    #[arg(long, env = "RECEIVE_WAIT_SECS", default_value_t = 20)]
    pub receive_wait_secs: u64,

    /// Lease on a received message before it is redelivered, in seconds
    #[arg(long, env = "VISIBILITY_TIMEOUT_SECS", default_value_t = 30)]
    pub visibility_timeout_secs: u64,

    /// Deliveries before an unacknowledged message is dead-lettered
    #[arg(long, env = "MAX_RECEIVE_COUNT", default_value_t = 5)]
    pub max_receive_count: u32,

    /// Pause after a failed receive, in seconds
    #[arg(long, env = "POLL_ERROR_BACKOFF_SECS", default_value_t = 5)]
    pub poll_error_backoff_secs: u64,

    /// Orders kept in memory before the oldest finished ones are dropped
    #[arg(long, env = "ORDER_RETENTION", default_value_t = 100_000)]
    pub order_retention: usize,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.min_workers == 0 {
            return Err(EngineError::Config("min-workers must be at least 1".into()));
        }
        if self.min_workers > self.max_workers {
            return Err(EngineError::Config(format!(
                "min-workers ({}) exceeds max-workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.workers < self.min_workers || self.workers > self.max_workers {
            return Err(EngineError::Config(format!(
                "workers must be between {} and {} (got {})",
                self.min_workers, self.max_workers, self.workers
            )));
        }
        if self.payment_concurrency == 0 {
            return Err(EngineError::Config(
                "payment-concurrency must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.payment_failure_rate) {
            return Err(EngineError::Config(format!(
                "payment-failure-rate must be between 0 and 1 (got {})",
                self.payment_failure_rate
            )));
        }
        if !(1..=MAX_RECEIVE_BATCH).contains(&self.receive_batch_size) {
            return Err(EngineError::Config(format!(
                "receive-batch-size must be between 1 and {MAX_RECEIVE_BATCH} (got {})",
                self.receive_batch_size
            )));
        }
        if self.max_receive_count == 0 {
            return Err(EngineError::Config(
                "max-receive-count must be at least 1".into(),
            ));
        }
        if self.visibility_timeout_secs == 0 {
            return Err(EngineError::Config(
                "visibility-timeout-secs must be at least 1".into(),
            ));
        }
        if self.order_retention == 0 {
            return Err(EngineError::Config(
                "order-retention must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn payment_latency(&self) -> Duration {
        Duration::from_millis(self.payment_latency_ms)
    }

    pub fn receive_settings(&self) -> ReceiveSettings {
        ReceiveSettings {
            max_messages: self.receive_batch_size,
            wait: Duration::from_secs(self.receive_wait_secs),
            error_backoff: Duration::from_secs(self.poll_error_backoff_secs),
        }
    }

    pub fn worker_limits(&self) -> WorkerLimits {
        WorkerLimits {
            min: self.min_workers,
            max: self.max_workers,
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            max_receive_count: self.max_receive_count,
        }
    }
}
