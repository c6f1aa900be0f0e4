use crate::application::engine::OrderEngine;
use crate::domain::ports::QueueClientRef;
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

/// How each worker polls the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSettings {
    pub max_messages: usize,
    /// Long-poll wait per receive call.
    pub wait: Duration,
    /// Pause after a failed receive before polling again.
    pub error_backoff: Duration,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait: Duration::from_secs(20),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Inclusive bounds on the number of workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self { min: 1, max: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleOutcome {
    pub previous: usize,
    pub current: usize,
}

struct ScaleState {
    spawned: usize,
    workers: JoinSet<()>,
}

/// A resizable set of queue consumers sharing one engine and one stop signal.
///
/// Resizing is serialized by a single mutex. Reads of the configured and
/// active counts go through atomics and never wait on it.
pub struct WorkerPool {
    engine: Arc<OrderEngine>,
    queue: QueueClientRef,
    receive: ReceiveSettings,
    limits: WorkerLimits,
    configured: AtomicUsize,
    stop_tx: watch::Sender<bool>,
    scale: Mutex<ScaleState>,
}

impl WorkerPool {
    pub fn new(
        engine: Arc<OrderEngine>,
        queue: QueueClientRef,
        receive: ReceiveSettings,
        limits: WorkerLimits,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            engine,
            queue,
            receive,
            limits,
            configured: AtomicUsize::new(0),
            stop_tx,
            scale: Mutex::new(ScaleState {
                spawned: 0,
                workers: JoinSet::new(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<OrderEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &QueueClientRef {
        &self.queue
    }

    /// Workers spawned and not yet told to stop.
    pub fn configured_workers(&self) -> usize {
        self.configured.load(Ordering::Acquire)
    }

    /// Workers currently running their loop.
    pub fn active_workers(&self) -> usize {
        self.engine.metrics().active_workers()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Spawns the initial set of workers.
    pub async fn start(&self, workers: usize) -> Result<ScaleOutcome> {
        let outcome = self.set_worker_count(workers as i64).await?;
        tracing::info!(workers = outcome.current, "worker pool started");
        Ok(outcome)
    }

    /// Grows the pool to `target` workers.
    ///
    /// Targets outside the configured limits are rejected, and so is any
    /// target below the current size: workers are never stopped individually.
    /// Asking for the current size is accepted and changes nothing.
    pub async fn set_worker_count(&self, target: i64) -> Result<ScaleOutcome> {
        if target < self.limits.min as i64 || target > self.limits.max as i64 {
            return Err(EngineError::InvalidWorkerCount {
                requested: target,
                min: self.limits.min,
                max: self.limits.max,
            });
        }
        let target = target as usize;

        let mut state = self.scale.lock().await;
        if self.is_stopping() {
            return Err(EngineError::PoolStopped);
        }

        let previous = state.spawned;
        if target < previous {
            tracing::warn!(
                current = previous,
                requested = target,
                "rejecting scale down"
            );
            return Err(EngineError::ScaleDownUnsupported {
                current: previous,
                requested: target,
            });
        }

        if target > previous {
            tracing::info!(adding = target - previous, total = target, "scaling up");
        }
        for id in previous..target {
            state.workers.spawn(run_worker(
                id,
                Arc::clone(&self.engine),
                Arc::clone(&self.queue),
                self.receive,
                self.stop_tx.subscribe(),
            ));
        }
        state.spawned = target;
        self.configured.store(target, Ordering::Release);

        Ok(ScaleOutcome {
            previous,
            current: target,
        })
    }

    /// Raises the stop signal and waits for every worker to drain.
    ///
    /// Workers blocked in a receive exit at once; workers holding a batch
    /// finish every message in it first.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        let mut state = self.scale.lock().await;
        tracing::info!(workers = state.spawned, "stopping worker pool");

        while let Some(joined) = state.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
        state.spawned = 0;
        self.configured.store(0, Ordering::Release);
        tracing::info!("worker pool stopped");
    }
}

async fn run_worker(
    id: usize,
    engine: Arc<OrderEngine>,
    queue: QueueClientRef,
    settings: ReceiveSettings,
    mut stop: watch::Receiver<bool>,
) {
    let _active = engine.metrics().worker_started();
    tracing::info!(worker = id, "worker started");

    loop {
        if *stop.borrow() {
            break;
        }

        let received = tokio::select! {
            biased;
            _ = stop.changed() => break,
            received = queue.receive_batch(settings.max_messages, settings.wait) => received,
        };

        match received {
            Ok(batch) => {
                for message in batch {
                    engine.handle_message(queue.as_ref(), message, id).await;
                }
            }
            Err(e) => {
                tracing::warn!(worker = id, error = %e, "error polling messages");
                engine.metrics().record_receive_error();
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(settings.error_backoff) => {}
                }
            }
        }
    }

    tracing::info!(worker = id, "worker stopping");
}
