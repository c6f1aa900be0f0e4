use crate::domain::order::Order;
use crate::domain::ports::{PaymentVerifier, Verdict};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Payment verification that takes a fixed time and declines a fraction of
/// orders at random.
#[derive(Debug, Clone)]
pub struct SimulatedPaymentVerifier {
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedPaymentVerifier {
    /// `failure_rate` is clamped into `[0, 1]`; a NaN or infinite rate
    /// declines nothing.
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            latency,
            failure_rate,
        }
    }
}

#[async_trait]
impl PaymentVerifier for SimulatedPaymentVerifier {
    async fn verify(&self, order: &Order) -> Verdict {
        tracing::debug!(order_id = %order.order_id, latency_ms = self.latency.as_millis() as u64, "verifying payment");
        tokio::time::sleep(self.latency).await;

        let declined = rand::thread_rng().gen_bool(self.failure_rate);
        if declined {
            Verdict::Declined(format!("payment declined for order {}", order.order_id))
        } else {
            Verdict::Approved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let verifier = SimulatedPaymentVerifier::new(Duration::from_secs(3), 0.0);
        let order = Order::new("o-1", 1, vec![]);

        let started = Instant::now();
        assert_eq!(verifier.verify(&order).await, Verdict::Approved);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_always_declines_at_full_rate() {
        let verifier = SimulatedPaymentVerifier::new(Duration::ZERO, 1.0);
        let order = Order::new("o-2", 1, vec![]);
        assert!(matches!(verifier.verify(&order).await, Verdict::Declined(_)));
    }

    #[test]
    fn test_failure_rate_is_clamped() {
        let verifier = SimulatedPaymentVerifier::new(Duration::ZERO, 7.5);
        assert_eq!(verifier.failure_rate, 1.0);
        let verifier = SimulatedPaymentVerifier::new(Duration::ZERO, -1.0);
        assert_eq!(verifier.failure_rate, 0.0);
    }

    #[tokio::test]
    async fn test_non_finite_failure_rate_approves() {
        let order = Order::new("o-3", 1, vec![]);
        for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let verifier = SimulatedPaymentVerifier::new(Duration::ZERO, rate);
            assert_eq!(verifier.failure_rate, 0.0);
            assert_eq!(verifier.verify(&order).await, Verdict::Approved);
        }
    }
}
