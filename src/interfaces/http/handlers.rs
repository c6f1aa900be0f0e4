use super::error::AppError;
use super::state::AppState;
use crate::domain::order::{NewOrder, OrderStatus};
use crate::error::EngineError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;

/// GET /health: liveness plus worker counts and running totals.
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    let snapshot = app.pool.engine().metrics().snapshot();
    let status = if app.pool.is_stopping() {
        "draining"
    } else {
        "healthy"
    };
    Json(json!({
        "status": status,
        "timestamp": Utc::now().timestamp(),
        "workers": {
            "configured": app.pool.configured_workers(),
            "active": app.pool.active_workers(),
        },
        "metrics": {
            "messages_received": snapshot.messages_received,
            "orders_processed": snapshot.orders_processed,
            "orders_failed": snapshot.orders_failed,
        },
    }))
}

/// GET /metrics: full counter snapshot, gate usage, order status counts and,
/// when the queue reports it, queue depth.
pub async fn metrics(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let engine = app.pool.engine();
    let snapshot = engine.metrics().snapshot();
    let counts = engine.store().status_counts().await?;
    let orders: serde_json::Map<String, Value> = OrderStatus::ALL
        .iter()
        .map(|status| {
            let count = counts.get(status).copied().unwrap_or_default();
            (status.to_string(), json!(count))
        })
        .collect();

    let queue = match app.pool.queue().depth().await {
        Ok(Some(depth)) => json!({
            "queue_depth": depth.visible,
            "in_flight": depth.in_flight,
        }),
        Ok(None) => json!({}),
        Err(e) => {
            tracing::debug!(error = %e, "queue depth unavailable");
            json!({})
        }
    };

    Ok(Json(json!({
        "timestamp": Utc::now().timestamp(),
        "processor": snapshot,
        "gate": engine.gate().stats(),
        "orders": orders,
        "queue": queue,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub workers: i64,
}

/// POST /scale: grow the worker pool.
pub async fn scale(
    State(app): State<AppState>,
    payload: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let outcome = app.pool.set_worker_count(request.workers).await?;
    Ok(Json(json!({
        "message": "Worker count updated",
        "workers": outcome.current,
        "previous": outcome.previous,
    })))
}

/// GET /orders/{id}
pub async fn get_order(
    State(app): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let order = app
        .pool
        .engine()
        .store()
        .get(&order_id)
        .await?
        .ok_or_else(|| EngineError::OrderNotFound(order_id.clone()))?;
    Ok(Json(serde_json::to_value(order).map_err(EngineError::from)?))
}

/// POST /orders: accept an order for queued processing and return at once.
pub async fn create_order(
    State(app): State<AppState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(new_order) = payload?;
    let order = app.ingestor.submit(new_order).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "order_id": order.order_id,
            "status": "accepted",
            "message": "Order accepted for processing",
        })),
    ))
}

/// POST /orders/sync: verify the order before responding.
pub async fn create_order_sync(
    State(app): State<AppState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(new_order) = payload?;
    let started = Instant::now();
    let order = app.ingestor.submit_and_wait(new_order).await?;
    let processing_time = started.elapsed().as_secs_f64();

    let (status, message) = if order.status == OrderStatus::Completed {
        (StatusCode::OK, "Order processed successfully")
    } else {
        (StatusCode::PAYMENT_REQUIRED, "Payment processing failed")
    };
    Ok((
        status,
        Json(json!({
            "order_id": order.order_id,
            "status": order.status,
            "processing_time": processing_time,
            "message": message,
        })),
    ))
}
