use crate::application::engine::OrderEngine;
use crate::application::gate::AdmissionGate;
use crate::application::ingest::Ingestor;
use crate::application::metrics::MetricsRegistry;
use crate::application::pool::{ScaleOutcome, WorkerPool};
use crate::config::Config;
use crate::domain::ports::{
    OrderStoreRef, PaymentVerifierRef, QueueClientRef, QueuePublisherRef,
};
use crate::error::Result;
use crate::infrastructure::in_memory::InMemoryOrderStore;
use crate::infrastructure::memory_queue::InMemoryQueue;
use crate::infrastructure::simulated_payment::SimulatedPaymentVerifier;
use crate::interfaces::http::{self, state::AppState};
use axum::Router;
use std::sync::Arc;

/// Every long-lived component of the processor, built from one [`Config`].
pub struct App {
    pool: Arc<WorkerPool>,
    ingestor: Arc<Ingestor>,
    queue: InMemoryQueue,
    initial_workers: usize,
}

impl App {
    /// Builds the in-process deployment: in-memory store and queue, simulated
    /// payment verifier. No worker is started until [`App::start`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let verifier: PaymentVerifierRef = Arc::new(SimulatedPaymentVerifier::new(
            config.payment_latency(),
            config.payment_failure_rate,
        ));
        Self::with_verifier(config, verifier)
    }

    /// Same as [`App::from_config`] with a caller-supplied payment verifier.
    pub fn with_verifier(config: &Config, verifier: PaymentVerifierRef) -> Result<Self> {
        config.validate()?;
        let store: OrderStoreRef = Arc::new(InMemoryOrderStore::with_retention(
            config.order_retention,
        ));
        let queue = InMemoryQueue::new(config.queue_settings());
        let gate = AdmissionGate::new(config.payment_concurrency)?;
        let metrics = Arc::new(MetricsRegistry::new());
        let engine = Arc::new(OrderEngine::new(
            store,
            gate,
            verifier,
            metrics,
            config.max_receive_count,
        ));

        let client: QueueClientRef = Arc::new(queue.clone());
        let publisher: QueuePublisherRef = Arc::new(queue.clone());
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&engine),
            client,
            config.receive_settings(),
            config.worker_limits(),
        ));
        let ingestor = Arc::new(Ingestor::new(engine, publisher));

        Ok(Self {
            pool,
            ingestor,
            queue,
            initial_workers: config.workers,
        })
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn queue(&self) -> &InMemoryQueue {
        &self.queue
    }

    pub async fn start(&self) -> Result<ScaleOutcome> {
        self.pool.start(self.initial_workers).await
    }

    pub fn router(&self) -> Router {
        http::build_router(AppState {
            pool: Arc::clone(&self.pool),
            ingestor: Arc::clone(&self.ingestor),
        })
    }

    /// Signals every worker to stop and waits for in-flight batches.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use clap::Parser;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = Config::parse_from(["orderflow", "--payment-concurrency", "0"]);
        assert!(matches!(
            App::from_config(&config),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_spawns_configured_workers() {
        let config = Config::parse_from([
            "orderflow",
            "--workers",
            "3",
            "--payment-latency-ms",
            "0",
        ]);
        let app = App::from_config(&config).unwrap();
        assert_eq!(app.pool().configured_workers(), 0);

        let outcome = app.start().await.unwrap();
        assert_eq!(outcome.current, 3);
        assert_eq!(app.pool().configured_workers(), 3);

        app.shutdown().await;
        assert!(app.pool().is_stopping());
        assert_eq!(app.pool().active_workers(), 0);
    }
}
