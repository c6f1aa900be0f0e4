use crate::domain::order::OrderStatus;
use thiserror::Error;

/// Failures reported by a queue adapter.
///
/// Every variant is retryable from the engine's point of view: the worker logs
/// it and carries on, and an unacknowledged message comes back after its lease.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("transient queue failure: {0}")]
    Transient(String),
    #[error("unknown or expired delivery handle: {0}")]
    UnknownHandle(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("workers must be between {min} and {max} (requested {requested})")]
    InvalidWorkerCount {
        requested: i64,
        min: usize,
        max: usize,
    },
    #[error("scaling down is not supported (current {current}, requested {requested})")]
    ScaleDownUnsupported { current: usize, requested: usize },
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("order {0} is already being processed")]
    OrderInProgress(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("worker pool is shutting down")]
    PoolStopped,
    #[error("admission gate is closed")]
    GateClosed,
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
