use crate::application::gate::AdmissionGate;
use crate::application::metrics::MetricsRegistry;
use crate::domain::message::{QueueMessage, decode_order};
use crate::domain::order::Order;
use crate::domain::ports::{
    OrderStoreRef, Outcome, PaymentVerifierRef, ProcessingStart, QueueClient, Recorded, Verdict,
};
use crate::error::{EngineError, Result};
use chrono::Utc;
use std::sync::Arc;

/// What happened to a single delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Verified, recorded as completed and acknowledged.
    Acknowledged,
    /// Verified, but the acknowledgment failed; the queue will redeliver and
    /// the duplicate will be acknowledged then.
    AckFailed,
    /// The order was already completed by an earlier delivery.
    Duplicate,
    /// Another delivery of the order is still being verified; left for
    /// redelivery without a second verification.
    InProgress,
    /// Verification declined; left for redelivery.
    Rejected,
    /// Verification declined on the last permitted delivery, or the order had
    /// already failed; left for the queue to dead-letter.
    Exhausted,
    /// The payload could not be decoded into an order.
    Malformed,
    /// The record store or admission gate failed; left for redelivery.
    Unavailable,
}

/// Applies the admission-controlled payment verification to queued orders.
///
/// The engine owns no queue: the worker hands it each delivered message along
/// with the client it came from, so the same engine also serves the inline
/// (synchronous) ingestion path.
pub struct OrderEngine {
    store: OrderStoreRef,
    gate: AdmissionGate,
    verifier: PaymentVerifierRef,
    metrics: Arc<MetricsRegistry>,
    max_deliveries: u32,
}

impl OrderEngine {
    /// Creates a new `OrderEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - Record of every known order.
    /// * `gate` - Limits how many verifications run at once.
    /// * `verifier` - The downstream payment check.
    /// * `metrics` - Counters updated for every message.
    /// * `max_deliveries` - Delivery count at which a decline becomes final;
    ///   should match the queue's dead-letter threshold.
    pub fn new(
        store: OrderStoreRef,
        gate: AdmissionGate,
        verifier: PaymentVerifierRef,
        metrics: Arc<MetricsRegistry>,
        max_deliveries: u32,
    ) -> Self {
        Self {
            store,
            gate,
            verifier,
            metrics,
            max_deliveries: max_deliveries.max(1),
        }
    }

    pub fn store(&self) -> &OrderStoreRef {
        &self.store
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Handles one delivered message end to end.
    ///
    /// Errors never escape: each failure mode maps to a [`MessageOutcome`] and
    /// the message is acknowledged only once the order is recorded completed.
    pub async fn handle_message(
        &self,
        queue: &dyn QueueClient,
        message: QueueMessage,
        worker: usize,
    ) -> MessageOutcome {
        self.metrics.record_received();

        let order = match decode_order(&message.payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(worker, delivery_count = message.delivery_count, error = %e, "discarding malformed message");
                self.metrics.record_malformed();
                return MessageOutcome::Malformed;
            }
        };
        let order_id = order.order_id.clone();

        let order = match self.store.begin_processing(order).await {
            Ok(ProcessingStart::Started(order)) => order,
            Ok(ProcessingStart::AlreadyCompleted(_)) => {
                tracing::info!(worker, order_id = %order_id, "duplicate delivery of completed order");
                self.metrics.record_duplicate();
                if let Err(e) = queue.acknowledge(&message.handle).await {
                    tracing::warn!(worker, order_id = %order_id, error = %e, "failed to acknowledge duplicate");
                    self.metrics.record_ack_failure();
                }
                return MessageOutcome::Duplicate;
            }
            Ok(ProcessingStart::InProgress(_)) => {
                tracing::info!(
                    worker,
                    order_id = %order_id,
                    delivery_count = message.delivery_count,
                    "order is being verified by another delivery, leaving message"
                );
                return MessageOutcome::InProgress;
            }
            Ok(ProcessingStart::AlreadyFailed(_)) => {
                tracing::warn!(worker, order_id = %order_id, "redelivery of failed order, leaving for dead letter");
                self.metrics.record_failed();
                return MessageOutcome::Exhausted;
            }
            Err(e) => {
                tracing::error!(worker, order_id = %order_id, error = %e, "could not mark order processing");
                self.metrics.record_failed();
                return MessageOutcome::Unavailable;
            }
        };

        tracing::info!(
            worker,
            order_id = %order_id,
            customer_id = order.customer_id,
            delivery_count = message.delivery_count,
            "processing order"
        );

        let verdict = match self.verify(&order).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(worker, order_id = %order_id, error = %e, "admission gate unavailable");
                self.metrics.record_failed();
                return MessageOutcome::Unavailable;
            }
        };

        let exhausted = message.delivery_count >= self.max_deliveries;
        let outcome = match &verdict {
            Verdict::Approved => Outcome::Completed { at: Utc::now() },
            Verdict::Declined(reason) if exhausted => Outcome::Failed {
                reason: reason.clone(),
            },
            Verdict::Declined(reason) => Outcome::Rejected {
                reason: reason.clone(),
            },
        };

        let first_completion = match self.store.record_outcome(&order_id, outcome).await {
            Ok(Recorded::Applied(_)) => match &verdict {
                Verdict::Approved => {
                    self.metrics.record_processed();
                    true
                }
                Verdict::Declined(reason) => {
                    self.metrics.record_failed();
                    tracing::warn!(
                        worker,
                        order_id = %order_id,
                        delivery_count = message.delivery_count,
                        reason = %reason,
                        "payment declined, leaving message for redelivery"
                    );
                    return if exhausted {
                        MessageOutcome::Exhausted
                    } else {
                        MessageOutcome::Rejected
                    };
                }
            },
            Ok(Recorded::AlreadyCompleted(_)) => {
                tracing::info!(worker, order_id = %order_id, "order was completed by another delivery");
                self.metrics.record_duplicate();
                false
            }
            Err(e) => {
                tracing::error!(worker, order_id = %order_id, error = %e, "could not record outcome");
                self.metrics.record_failed();
                return MessageOutcome::Unavailable;
            }
        };

        match queue.acknowledge(&message.handle).await {
            Ok(()) if first_completion => {
                tracing::info!(worker, order_id = %order_id, "order completed");
                MessageOutcome::Acknowledged
            }
            Ok(()) => MessageOutcome::Duplicate,
            Err(e) => {
                tracing::warn!(worker, order_id = %order_id, error = %e, "failed to acknowledge completed order");
                self.metrics.record_ack_failure();
                MessageOutcome::AckFailed
            }
        }
    }

    /// Runs an order through the gate and verifier without a queue.
    ///
    /// This is the blocking path the queue exists to replace: the caller waits
    /// for its slot and for the verification itself. A decline is final.
    pub async fn process_inline(&self, order: Order) -> Result<Order> {
        let order_id = order.order_id.clone();
        let order = match self.store.begin_processing(order).await? {
            ProcessingStart::Started(order) => order,
            ProcessingStart::AlreadyCompleted(order) | ProcessingStart::AlreadyFailed(order) => {
                return Ok(order);
            }
            ProcessingStart::InProgress(_) => return Err(EngineError::OrderInProgress(order_id)),
        };

        let verdict = self.verify(&order).await?;
        let outcome = match &verdict {
            Verdict::Approved => Outcome::Completed { at: Utc::now() },
            Verdict::Declined(reason) => Outcome::Failed {
                reason: reason.clone(),
            },
        };
        match self.store.record_outcome(&order_id, outcome).await? {
            Recorded::Applied(order) => {
                if verdict == Verdict::Approved {
                    self.metrics.record_processed();
                } else {
                    self.metrics.record_failed();
                }
                Ok(order)
            }
            Recorded::AlreadyCompleted(order) => {
                self.metrics.record_duplicate();
                Ok(order)
            }
        }
    }

    async fn verify(&self, order: &Order) -> Result<Verdict> {
        let _slot = self.gate.acquire().await?;
        Ok(self.verifier.verify(order).await)
    }
}
