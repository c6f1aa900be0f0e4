#![allow(dead_code)]

use async_trait::async_trait;
use orderflow::application::engine::OrderEngine;
use orderflow::application::gate::AdmissionGate;
use orderflow::application::metrics::MetricsRegistry;
use orderflow::application::pool::{ReceiveSettings, WorkerLimits, WorkerPool};
use orderflow::domain::order::Order;
use orderflow::domain::ports::{PaymentVerifier, QueueClientRef, Verdict};
use orderflow::infrastructure::in_memory::InMemoryOrderStore;
use orderflow::infrastructure::memory_queue::{InMemoryQueue, QueueSettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Verifier that records how many verifications overlap.
///
/// Each order is declined on its first `declines` attempts and approved after.
pub struct ScriptedVerifier {
    latency: Duration,
    declines: u32,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedVerifier {
    pub fn approving(latency: Duration) -> Arc<Self> {
        Self::declining_first(latency, 0)
    }

    pub fn declining_first(latency: Duration, declines: u32) -> Arc<Self> {
        Arc::new(Self {
            latency,
            declines,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
        })
    }

    pub fn always_declining(latency: Duration) -> Arc<Self> {
        Self::declining_first(latency, u32::MAX)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentVerifier for ScriptedVerifier {
    async fn verify(&self, order: &Order) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(order.order_id.clone()).or_default();
            *entry += 1;
            *entry
        };
        if attempt <= self.declines {
            Verdict::Declined(format!("attempt {attempt} declined"))
        } else {
            Verdict::Approved
        }
    }
}

pub fn order_payload(order_id: &str) -> String {
    serde_json::json!({
        "order_id": order_id,
        "customer_id": 42,
        "items": [
            { "product_id": "sku-1", "quantity": 2, "price": 9.99 }
        ]
    })
    .to_string()
}

/// One message per receive, so every worker holds at most one order.
pub fn single_message_receive() -> ReceiveSettings {
    ReceiveSettings {
        max_messages: 1,
        ..ReceiveSettings::default()
    }
}

pub struct Harness {
    pub queue: InMemoryQueue,
    pub engine: Arc<OrderEngine>,
    pub pool: WorkerPool,
}

pub fn harness(
    verifier: Arc<ScriptedVerifier>,
    concurrency: usize,
    queue_settings: QueueSettings,
    receive: ReceiveSettings,
) -> Harness {
    let queue = InMemoryQueue::new(queue_settings);
    let client: QueueClientRef = Arc::new(queue.clone());
    harness_with_client(verifier, concurrency, queue, client, receive)
}

pub fn harness_with_client(
    verifier: Arc<ScriptedVerifier>,
    concurrency: usize,
    queue: InMemoryQueue,
    client: QueueClientRef,
    receive: ReceiveSettings,
) -> Harness {
    let engine = Arc::new(OrderEngine::new(
        Arc::new(InMemoryOrderStore::new()),
        AdmissionGate::new(concurrency).unwrap(),
        verifier,
        Arc::new(MetricsRegistry::new()),
        queue.settings().max_receive_count,
    ));
    let pool = WorkerPool::new(
        Arc::clone(&engine),
        client,
        receive,
        WorkerLimits::default(),
    );
    Harness {
        queue,
        engine,
        pool,
    }
}

/// Polls until `done` holds, checking every 10ms of (possibly paused) time.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    while !done() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
