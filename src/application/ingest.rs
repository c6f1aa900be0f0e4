use crate::application::engine::OrderEngine;
use crate::domain::order::{NewOrder, Order};
use crate::domain::ports::QueuePublisherRef;
use crate::error::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Producer-side entry point: turns submitted orders into queued work.
pub struct Ingestor {
    engine: Arc<OrderEngine>,
    publisher: QueuePublisherRef,
}

impl Ingestor {
    pub fn new(engine: Arc<OrderEngine>, publisher: QueuePublisherRef) -> Self {
        Self { engine, publisher }
    }

    /// Records the order as pending and publishes it, returning without
    /// waiting for verification.
    ///
    /// If publishing fails the order stays pending and the error is returned
    /// to the caller.
    pub async fn submit(&self, new_order: NewOrder) -> Result<Order> {
        let order = Self::prepare(new_order);
        self.engine.store().insert(order.clone()).await?;

        let payload = serde_json::to_string(&order)?;
        if let Err(e) = self.publisher.publish(payload).await {
            tracing::error!(order_id = %order.order_id, error = %e, "failed to publish order");
            return Err(e.into());
        }

        self.engine.metrics().record_accepted();
        tracing::info!(order_id = %order.order_id, customer_id = order.customer_id, "order accepted for processing");
        Ok(order)
    }

    /// Verifies the order before returning, holding the caller for as long as
    /// the admission gate and the payment check take.
    pub async fn submit_and_wait(&self, new_order: NewOrder) -> Result<Order> {
        let order = Self::prepare(new_order);
        self.engine.store().insert(order.clone()).await?;
        self.engine.metrics().record_accepted();
        self.engine.process_inline(order).await
    }

    fn prepare(new_order: NewOrder) -> Order {
        let order_id = new_order
            .order_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Order::new(order_id, new_order.customer_id, new_order.items)
    }
}
