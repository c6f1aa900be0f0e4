use super::message::{DeliveryHandle, QueueDepth, QueueMessage};
use super::order::{Order, OrderStatus};
use crate::error::{QueueError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What the store found when a worker asked to start processing an order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingStart {
    /// The order is now `Processing`; the returned copy reflects that.
    Started(Order),
    /// A previous delivery already completed the order.
    AlreadyCompleted(Order),
    /// A previous delivery exhausted its attempts.
    AlreadyFailed(Order),
    /// Another delivery of the same order is being verified right now.
    InProgress(Order),
}

/// What `record_outcome` did to the stored order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// The outcome was applied; the returned copy reflects it.
    Applied(Order),
    /// The order had already completed and was left unchanged.
    AlreadyCompleted(Order),
}

impl Recorded {
    pub fn into_order(self) -> Order {
        match self {
            Recorded::Applied(order) | Recorded::AlreadyCompleted(order) => order,
        }
    }
}

/// Result of one verification attempt, as recorded in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { at: DateTime<Utc> },
    Rejected { reason: String },
    Failed { reason: String },
}

/// Concurrency-safe record of every order the process knows about.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Records a freshly ingested order. An existing record with the same id
    /// is left untouched.
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, order_id: &str) -> Result<Option<Order>>;
    /// Moves the order to `Processing`, recording it first if this process
    /// has never seen it. At most one delivery of an order holds it in
    /// `Processing` at a time.
    async fn begin_processing(&self, order: Order) -> Result<ProcessingStart>;
    /// Applies a verification outcome. A completed order is never changed.
    async fn record_outcome(&self, order_id: &str, outcome: Outcome) -> Result<Recorded>;
    async fn status_counts(&self) -> Result<HashMap<OrderStatus, usize>>;
    async fn count(&self) -> Result<usize>;
}

/// The narrow contract the engine holds against an external durable queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-polls for up to `max_messages`, waiting at most `wait` when the
    /// queue is empty.
    async fn receive_batch(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> std::result::Result<Vec<QueueMessage>, QueueError>;

    /// Permanently removes the delivered message.
    async fn acknowledge(&self, handle: &DeliveryHandle) -> std::result::Result<(), QueueError>;

    /// Point-in-time depth if the backend can report it.
    async fn depth(&self) -> std::result::Result<Option<QueueDepth>, QueueError> {
        Ok(None)
    }
}

/// Producer side of the queue, used by ingestion.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, payload: String) -> std::result::Result<(), QueueError>;
}

/// Decision returned by the downstream payment verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Declined(String),
}

/// The latency-bearing downstream operation guarded by the admission gate.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, order: &Order) -> Verdict;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type QueueClientRef = Arc<dyn QueueClient>;
pub type QueuePublisherRef = Arc<dyn QueuePublisher>;
pub type PaymentVerifierRef = Arc<dyn PaymentVerifier>;
