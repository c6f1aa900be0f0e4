use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A strictly positive number of units on an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(EngineError::InvalidOrder(
                "quantity must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = EngineError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

/// Non-negative price of a single unit.
///
/// Travels as a JSON number, the same shape producers have always emitted, and
/// is held as a `Decimal` so line totals stay exact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct UnitPrice(Decimal);

impl UnitPrice {
    pub fn new(value: Decimal) -> Result<Self> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EngineError::InvalidOrder(
                "unit price must not be negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for UnitPrice {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl Serialize for UnitPrice {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for UnitPrice {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = rust_decimal::serde::float::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

/// A single order line. Immutable once attached to an [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub product_id: String,
    pub quantity: Quantity,
    pub price: UnitPrice,
}

impl Item {
    pub fn new(product_id: impl Into<String>, quantity: Quantity, price: UnitPrice) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.price.value() * Decimal::from(self.quantity.value())
    }
}

/// Lifecycle of an order inside the record store.
///
/// `Rejected` means the downstream verification declined this attempt while
/// the queue still holds the message for redelivery. `Failed` is only reached
/// when the decline happened on the last delivery the queue will make.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Rejected,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Rejected,
        OrderStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Rejected, Processing)
                | (Processing, Completed)
                | (Processing, Rejected)
                | (Processing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An e-commerce order as recorded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: i64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Verification attempts observed by this process.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Order {
    pub fn new(order_id: impl Into<String>, customer_id: i64, items: Vec<Item>) -> Self {
        Self {
            order_id: order_id.into(),
            customer_id,
            status: OrderStatus::Pending,
            items,
            created_at: Utc::now(),
            processed_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(Item::line_total).sum()
    }

    /// Moves the order to `next`, enforcing the monotonic lifecycle.
    ///
    /// Entering `Processing` counts an attempt; entering `Completed` stamps the
    /// completion time.
    pub fn advance(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                order_id: self.order_id.clone(),
                from: self.status,
                to: next,
            });
        }
        match next {
            OrderStatus::Processing => self.attempts += 1,
            OrderStatus::Completed => {
                self.processed_at = Some(now);
                self.last_error = None;
            }
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}

/// An order as submitted by a producer, before the engine has seen it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub order_id: Option<String>,
    pub customer_id: i64,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(qty: u32, price: Decimal) -> Item {
        Item::new("sku-1", Quantity::new(qty).unwrap(), UnitPrice::new(price).unwrap())
    }

    #[test]
    fn test_quantity_validation() {
        assert!(Quantity::new(1).is_ok());
        assert!(matches!(
            Quantity::new(0),
            Err(EngineError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_unit_price_validation() {
        assert!(UnitPrice::new(dec!(0)).is_ok());
        assert!(UnitPrice::new(dec!(19.99)).is_ok());
        assert!(matches!(
            UnitPrice::new(dec!(-0.01)),
            Err(EngineError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_order_total() {
        let order = Order::new("o-1", 7, vec![item(2, dec!(1.25)), item(1, dec!(10))]);
        assert_eq!(order.total(), dec!(12.50));
    }

    #[test]
    fn test_item_wire_format_uses_numbers() {
        let json = r#"{"product_id":"sku-9","quantity":3,"price":9.99}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.quantity.value(), 3);
        assert_eq!(item.price.value(), dec!(9.99));

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["price"], serde_json::json!(9.99));
        assert_eq!(back["quantity"], serde_json::json!(3));
    }

    #[test]
    fn test_item_rejects_zero_quantity_and_negative_price() {
        let zero = r#"{"product_id":"a","quantity":0,"price":1.0}"#;
        assert!(serde_json::from_str::<Item>(zero).is_err());

        let negative = r#"{"product_id":"a","quantity":1,"price":-2.5}"#;
        assert!(serde_json::from_str::<Item>(negative).is_err());
    }

    #[test]
    fn test_items_keep_insertion_order() {
        let json = r#"{
            "order_id": "o-2",
            "customer_id": 1,
            "items": [
                {"product_id":"z","quantity":1,"price":1},
                {"product_id":"a","quantity":1,"price":1},
                {"product_id":"m","quantity":1,"price":1}
            ]
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = order.items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut order = Order::new("o-3", 1, vec![]);
        let now = Utc::now();
        order.advance(OrderStatus::Processing, now).unwrap();
        assert_eq!(order.attempts, 1);
        order.advance(OrderStatus::Completed, now).unwrap();
        assert_eq!(order.processed_at, Some(now));
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_rejected_order_can_be_retried() {
        let mut order = Order::new("o-4", 1, vec![]);
        let now = Utc::now();
        order.advance(OrderStatus::Processing, now).unwrap();
        order.advance(OrderStatus::Rejected, now).unwrap();
        assert!(!order.status.is_terminal());
        order.advance(OrderStatus::Processing, now).unwrap();
        assert_eq!(order.attempts, 2);
        order.advance(OrderStatus::Completed, now).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn test_never_reenters_pending_or_leaves_terminal() {
        let now = Utc::now();
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(OrderStatus::Pending));
        }

        let mut order = Order::new("o-5", 1, vec![]);
        order.advance(OrderStatus::Processing, now).unwrap();
        order.advance(OrderStatus::Failed, now).unwrap();
        assert!(matches!(
            order.advance(OrderStatus::Processing, now),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
        assert_eq!(OrderStatus::Processing.to_string(), "processing");
    }
}
