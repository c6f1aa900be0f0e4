use crate::domain::message::{DeliveryHandle, QueueDepth, QueueMessage};
use crate::domain::ports::{QueueClient, QueuePublisher};
use crate::error::QueueError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// How long a received message stays hidden before it is redelivered.
    pub visibility_timeout: Duration,
    /// Deliveries allowed before an unacknowledged message is dead-lettered.
    pub max_receive_count: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 5,
        }
    }
}

#[derive(Debug)]
struct Envelope {
    payload: String,
    receive_count: u32,
}

#[derive(Debug)]
struct Lease {
    envelope: Envelope,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<Envelope>,
    in_flight: HashMap<String, Lease>,
    dead_letters: Vec<String>,
}

/// In-process queue with at-least-once semantics.
///
/// Stands in for the external broker: receives take a lease on each message,
/// leases that expire without an acknowledgment make the message visible
/// again, and a message whose lease expires after `max_receive_count`
/// deliveries is moved to the dead-letter list instead.
#[derive(Clone)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    settings: QueueSettings,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(QueueSettings::default())
    }
}

impl InMemoryQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            settings,
        }
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings
    }

    /// Payloads diverted after exhausting their deliveries.
    pub async fn dead_letters(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        self.reclaim_expired(&mut state, Instant::now());
        state.dead_letters.clone()
    }

    /// True when nothing is visible or leased.
    pub async fn is_drained(&self) -> bool {
        let mut state = self.state.lock().await;
        self.reclaim_expired(&mut state, Instant::now());
        state.visible.is_empty() && state.in_flight.is_empty()
    }

    fn reclaim_expired(&self, state: &mut QueueState, now: Instant) {
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            let Some(lease) = state.in_flight.remove(&handle) else {
                continue;
            };
            let envelope = lease.envelope;
            if envelope.receive_count >= self.settings.max_receive_count {
                tracing::warn!(
                    receive_count = envelope.receive_count,
                    "message exhausted its deliveries, moving to dead letters"
                );
                state.dead_letters.push(envelope.payload);
            } else {
                state.visible.push_back(envelope);
            }
        }
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive_batch(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + wait;

        loop {
            // Register for wake-ups before inspecting state so a publish that
            // lands in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_expiry = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                self.reclaim_expired(&mut state, now);

                let mut batch = Vec::new();
                while batch.len() < max_messages {
                    let Some(mut envelope) = state.visible.pop_front() else {
                        break;
                    };
                    envelope.receive_count += 1;
                    let handle = Uuid::new_v4().to_string();
                    batch.push(QueueMessage {
                        payload: envelope.payload.clone(),
                        handle: DeliveryHandle::new(handle.clone()),
                        delivery_count: envelope.receive_count,
                    });
                    state.in_flight.insert(
                        handle,
                        Lease {
                            envelope,
                            expires_at: now + self.settings.visibility_timeout,
                        },
                    );
                }
                if !batch.is_empty() {
                    return Ok(batch);
                }
                state.in_flight.values().map(|lease| lease.expires_at).min()
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, handle: &DeliveryHandle) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        match state.in_flight.get(handle.as_str()) {
            Some(lease) if lease.expires_at > now => {
                state.in_flight.remove(handle.as_str());
                Ok(())
            }
            _ => Err(QueueError::UnknownHandle(handle.to_string())),
        }
    }

    async fn depth(&self) -> Result<Option<QueueDepth>, QueueError> {
        let mut state = self.state.lock().await;
        self.reclaim_expired(&mut state, Instant::now());
        Ok(Some(QueueDepth {
            visible: state.visible.len() as u64,
            in_flight: state.in_flight.len() as u64,
        }))
    }
}

#[async_trait]
impl QueuePublisher for InMemoryQueue {
    async fn publish(&self, payload: String) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.visible.push_back(Envelope {
            payload,
            receive_count: 0,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(visibility_secs: u64, max_receive_count: u32) -> InMemoryQueue {
        InMemoryQueue::new(QueueSettings {
            visibility_timeout: Duration::from_secs(visibility_secs),
            max_receive_count,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_respects_batch_size() {
        let q = queue(30, 5);
        for i in 0..15 {
            q.publish(format!("m{i}")).await.unwrap();
        }
        let first = q.receive_batch(10, Duration::from_secs(1)).await.unwrap();
        let second = q.receive_batch(10, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 5);
        assert!(first.iter().all(|m| m.delivery_count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_returns_empty_after_wait() {
        let q = queue(30, 5);
        let started = Instant::now();
        let batch = q.receive_batch(10, Duration::from_secs(20)).await.unwrap();
        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_publish() {
        let q = queue(30, 5);
        let consumer = q.clone();
        let handle = tokio::spawn(async move {
            consumer
                .receive_batch(10, Duration::from_secs(20))
                .await
                .unwrap()
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        q.publish("late".to_string()).await.unwrap();

        let batch = handle.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_message_is_hidden_until_expiry() {
        let q = queue(30, 5);
        q.publish("m".to_string()).await.unwrap();

        let first = q.receive_batch(1, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        let hidden = q.receive_batch(1, Duration::ZERO).await.unwrap();
        assert!(hidden.is_empty());

        let redelivered = q.receive_batch(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);
        assert_ne!(redelivered[0].handle, first[0].handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_removes_message() {
        let q = queue(30, 5);
        q.publish("m".to_string()).await.unwrap();
        let batch = q.receive_batch(1, Duration::ZERO).await.unwrap();
        q.acknowledge(&batch[0].handle).await.unwrap();

        assert!(q.is_drained().await);
        assert_eq!(
            q.acknowledge(&batch[0].handle).await,
            Err(QueueError::UnknownHandle(batch[0].handle.to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_after_lease_expiry_fails() {
        let q = queue(5, 5);
        q.publish("m".to_string()).await.unwrap();
        let batch = q.receive_batch(1, Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(q.acknowledge(&batch[0].handle).await.is_err());

        let depth = q.depth().await.unwrap().unwrap();
        assert_eq!(depth, QueueDepth { visible: 1, in_flight: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_after_max_receives() {
        let q = queue(1, 2);
        q.publish("poison".to_string()).await.unwrap();

        for _ in 0..2 {
            let batch = q.receive_batch(1, Duration::from_secs(5)).await.unwrap();
            assert_eq!(batch.len(), 1);
        }
        let none = q.receive_batch(1, Duration::from_secs(5)).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(q.dead_letters().await, vec!["poison".to_string()]);
        assert!(q.is_drained().await);
    }
}
