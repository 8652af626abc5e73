//! In-process gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    GatewayError, GatewayOrder, GatewayOrderStatus, GatewayPayment, GatewayPaymentStatus,
    PaymentGateway,
};

#[derive(Debug, Default)]
struct SandboxState {
    orders: HashMap<String, GatewayOrder>,
    payments: HashMap<String, Vec<GatewayPayment>>,
    next_order: u32,
    next_payment: u32,
    fail_on_create: bool,
    fail_on_fetch: bool,
}

/// Records orders and payments in memory, with failure toggles.
#[derive(Debug, Clone, Default)]
pub struct SandboxGateway {
    state: Arc<RwLock<SandboxState>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_order` fail as if the gateway were down.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Makes `fetch_order` and `fetch_payments` fail as if the gateway were down.
    pub fn set_fail_on_fetch(&self, fail: bool) {
        self.state.write().unwrap().fail_on_fetch = fail;
    }

    /// Records a payment attempt and returns its id.
    ///
    /// The order becomes `paid` on capture and `attempted` otherwise.
    pub fn record_payment(
        &self,
        gateway_order_ref: &str,
        status: GatewayPaymentStatus,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.write().unwrap();
        let amount = match state.orders.get_mut(gateway_order_ref) {
            Some(order) => {
                order.status = match (order.status, status) {
                    (GatewayOrderStatus::Paid, _) | (_, GatewayPaymentStatus::Captured) => {
                        GatewayOrderStatus::Paid
                    }
                    _ => GatewayOrderStatus::Attempted,
                };
                order.amount
            }
            None => return Err(GatewayError::UnknownOrder(gateway_order_ref.to_string())),
        };

        state.next_payment += 1;
        let payment = GatewayPayment {
            id: format!("pay_{:06}", state.next_payment),
            order_id: gateway_order_ref.to_string(),
            status,
            amount,
        };
        let id = payment.id.clone();
        state
            .payments
            .entry(gateway_order_ref.to_string())
            .or_default()
            .push(payment);
        Ok(id)
    }

    /// Backdates a gateway order.
    pub fn set_order_created_at(&self, gateway_order_ref: &str, created_at: DateTime<Utc>) {
        if let Some(order) = self.state.write().unwrap().orders.get_mut(gateway_order_ref) {
            order.created_at = created_at;
        }
    }

    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(GatewayError::Unavailable("sandbox: create_order disabled".into()));
        }
        if amount <= 0 {
            return Err(GatewayError::Rejected(format!("invalid amount {amount}")));
        }

        state.next_order += 1;
        let order = GatewayOrder {
            id: format!("order_{:06}", state.next_order),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
            status: GatewayOrderStatus::Created,
            created_at: Utc::now(),
        };
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, gateway_order_ref: &str) -> Result<GatewayOrder, GatewayError> {
        let state = self.state.read().unwrap();
        if state.fail_on_fetch {
            return Err(GatewayError::Unavailable("sandbox: fetch disabled".into()));
        }
        state
            .orders
            .get(gateway_order_ref)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownOrder(gateway_order_ref.to_string()))
    }

    async fn fetch_payments(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let state = self.state.read().unwrap();
        if state.fail_on_fetch {
            return Err(GatewayError::Unavailable("sandbox: fetch disabled".into()));
        }
        if !state.orders.contains_key(gateway_order_ref) {
            return Err(GatewayError::UnknownOrder(gateway_order_ref.to_string()));
        }
        Ok(state
            .payments
            .get(gateway_order_ref)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_fetch() {
        let gateway = SandboxGateway::new();
        let order = gateway.create_order(85_000, "INR", "rcpt_1").await.unwrap();

        assert!(order.id.starts_with("order_"));
        assert_eq!(order.status, GatewayOrderStatus::Created);
        assert_eq!(gateway.fetch_order(&order.id).await.unwrap(), order);
        assert!(gateway.fetch_payments(&order.id).await.unwrap().is_empty());
        assert_eq!(gateway.order_count(), 1);
    }

    #[tokio::test]
    async fn test_payments_move_order_status() {
        let gateway = SandboxGateway::new();
        let order = gateway.create_order(1_000, "INR", "rcpt_1").await.unwrap();

        gateway
            .record_payment(&order.id, GatewayPaymentStatus::Failed)
            .unwrap();
        assert_eq!(
            gateway.fetch_order(&order.id).await.unwrap().status,
            GatewayOrderStatus::Attempted
        );

        gateway
            .record_payment(&order.id, GatewayPaymentStatus::Captured)
            .unwrap();
        assert_eq!(
            gateway.fetch_order(&order.id).await.unwrap().status,
            GatewayOrderStatus::Paid
        );
        assert_eq!(gateway.fetch_payments(&order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let gateway = SandboxGateway::new();
        gateway.set_fail_on_create(true);
        assert!(matches!(
            gateway.create_order(1_000, "INR", "rcpt").await,
            Err(GatewayError::Unavailable(_))
        ));
        assert_eq!(gateway.order_count(), 0);

        gateway.set_fail_on_create(false);
        let order = gateway.create_order(1_000, "INR", "rcpt").await.unwrap();
        gateway.set_fail_on_fetch(true);
        assert!(gateway.fetch_order(&order.id).await.is_err());
        assert!(gateway.fetch_payments(&order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let gateway = SandboxGateway::new();
        assert!(matches!(
            gateway.fetch_order("order_missing").await,
            Err(GatewayError::UnknownOrder(_))
        ));
        assert!(gateway
            .record_payment("order_missing", GatewayPaymentStatus::Captured)
            .is_err());
    }
}
