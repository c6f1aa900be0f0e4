use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{OrderStore, Outcome, ProcessingStart, Recorded};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_RETENTION: usize = 100_000;

#[derive(Default)]
struct StoreState {
    orders: HashMap<String, Order>,
    /// Ids of terminal orders, oldest first. Only these are ever evicted.
    terminal: VecDeque<String>,
}

/// A thread-safe in-memory order record store.
///
/// Uses `Arc<RwLock<..>>` so clones share the same records. The lock is held
/// for a single read-modify-write and never across an await on anything else.
/// Once more than `retention` orders are recorded, the oldest terminal orders
/// are dropped; pending and in-flight orders are always kept.
#[derive(Clone)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<StoreState>>,
    retention: usize,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl InMemoryOrderStore {
    /// Creates a new, empty store with the default retention bound.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            retention: retention.max(1),
        }
    }

    fn enforce_retention(&self, state: &mut StoreState) {
        while state.orders.len() > self.retention {
            let Some(oldest) = state.terminal.pop_front() else {
                break;
            };
            state.orders.remove(&oldest);
            tracing::debug!(order_id = %oldest, "evicted terminal order");
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.entry(order.order_id.clone()).or_insert(order);
        self.enforce_retention(&mut state);
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(order_id).cloned())
    }

    async fn begin_processing(&self, order: Order) -> Result<ProcessingStart> {
        let mut state = self.state.write().await;
        let record = state
            .orders
            .entry(order.order_id.clone())
            .or_insert_with(|| Order {
                status: OrderStatus::Pending,
                processed_at: None,
                attempts: 0,
                last_error: None,
                ..order
            });

        let start = match record.status {
            OrderStatus::Completed => ProcessingStart::AlreadyCompleted(record.clone()),
            OrderStatus::Failed => ProcessingStart::AlreadyFailed(record.clone()),
            // The lease ran out while another worker still holds the order.
            OrderStatus::Processing => ProcessingStart::InProgress(record.clone()),
            OrderStatus::Pending | OrderStatus::Rejected => {
                record.advance(OrderStatus::Processing, Utc::now())?;
                ProcessingStart::Started(record.clone())
            }
        };
        self.enforce_retention(&mut state);
        Ok(start)
    }

    async fn record_outcome(&self, order_id: &str, outcome: Outcome) -> Result<Recorded> {
        let mut state = self.state.write().await;
        let record = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        if record.status == OrderStatus::Completed {
            return Ok(Recorded::AlreadyCompleted(record.clone()));
        }

        match outcome {
            Outcome::Completed { at } => record.advance(OrderStatus::Completed, at)?,
            Outcome::Rejected { reason } => {
                record.advance(OrderStatus::Rejected, Utc::now())?;
                record.last_error = Some(reason);
            }
            Outcome::Failed { reason } => {
                record.advance(OrderStatus::Failed, Utc::now())?;
                record.last_error = Some(reason);
            }
        }

        let updated = record.clone();
        if updated.status.is_terminal() {
            state.terminal.push_back(updated.order_id.clone());
            self.enforce_retention(&mut state);
        }
        Ok(Recorded::Applied(updated))
    }

    async fn status_counts(&self) -> Result<HashMap<OrderStatus, usize>> {
        let state = self.state.read().await;
        let mut counts: HashMap<OrderStatus, usize> =
            OrderStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for order in state.orders.values() {
            *counts.entry(order.status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.orders.len())
    }
}
