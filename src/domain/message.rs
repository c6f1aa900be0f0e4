use super::order::Order;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque receipt token issued by the queue for one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryHandle(String);

impl DeliveryHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One delivery of a queued order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub payload: String,
    pub handle: DeliveryHandle,
    /// Approximate number of times the queue has handed this message out,
    /// including this delivery.
    pub delivery_count: u32,
}

/// Point-in-time depth of the queue, for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub visible: u64,
    pub in_flight: u64,
}

/// Notification envelope wrapped around the order when it was fanned out
/// through a topic before landing in the queue.
#[derive(Debug, Deserialize)]
struct TopicEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

/// Decodes a queue payload into an [`Order`].
///
/// Accepts either a bare order document or a topic envelope whose `Message`
/// field carries the order document. An order without an identifier is
/// malformed: identifiers are assigned at ingestion.
pub fn decode_order(payload: &str) -> Result<Order> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| EngineError::MalformedMessage(e.to_string()))?;

    let order: Order = if value.get("Message").is_some() && value.get("order_id").is_none() {
        let envelope: TopicEnvelope = serde_json::from_value(value)
            .map_err(|e| EngineError::MalformedMessage(format!("envelope: {e}")))?;
        serde_json::from_str(&envelope.message)
            .map_err(|e| EngineError::MalformedMessage(format!("order: {e}")))?
    } else {
        serde_json::from_value(value)
            .map_err(|e| EngineError::MalformedMessage(format!("order: {e}")))?
    };

    if order.order_id.trim().is_empty() {
        return Err(EngineError::MalformedMessage(
            "order has no order_id".to_string(),
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = r#"{"order_id":"o-1","customer_id":42,"status":"pending","items":[{"product_id":"p","quantity":1,"price":2.5}],"created_at":"2024-01-01T00:00:00Z"}"#;

    #[test]
    fn test_decode_bare_order() {
        let order = decode_order(ORDER).unwrap();
        assert_eq!(order.order_id, "o-1");
        assert_eq!(order.customer_id, 42);
        assert_eq!(order.items.len(), 1);
    }

    #[test]
    fn test_decode_enveloped_order() {
        let envelope = serde_json::json!({
            "Type": "Notification",
            "MessageId": "m-1",
            "Message": ORDER,
            "Timestamp": "2024-01-01T00:00:00Z",
        })
        .to_string();
        let order = decode_order(&envelope).unwrap();
        assert_eq!(order.order_id, "o-1");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_order("not json"),
            Err(EngineError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_order(r#"{"Message":"{broken"}"#),
            Err(EngineError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_order(r#"{"customer_id":"abc"}"#),
            Err(EngineError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_requires_order_id() {
        let missing = r#"{"order_id":"  ","customer_id":1}"#;
        assert!(matches!(
            decode_order(missing),
            Err(EngineError::MalformedMessage(_))
        ));
    }
}
