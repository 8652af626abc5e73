//! Payment gateway abstraction.
//!
//! The saga only needs three calls from a gateway: open an order for an
//! amount, read it back, and list the payment attempts made against it.
//! Everything else (checkout UI, card handling) happens between the buyer
//! and the gateway.

mod sandbox;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sandbox::SandboxGateway;

/// Status of an order on the gateway side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOrderStatus {
    Created,
    /// At least one payment was attempted.
    Attempted,
    Paid,
}

impl GatewayOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOrderStatus::Created => "created",
            GatewayOrderStatus::Attempted => "attempted",
            GatewayOrderStatus::Paid => "paid",
        }
    }
}

/// Status of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    /// Opened but never submitted by the buyer.
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
}

/// An order opened with the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    /// Our own reference, echoed back by the gateway.
    pub receipt: String,
    pub status: GatewayOrderStatus,
    pub created_at: DateTime<Utc>,
}

/// A payment attempt against a gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: String,
    pub status: GatewayPaymentStatus,
    pub amount: i64,
}

/// Errors reported by a payment gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure, timeout or 5xx.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Unknown gateway order: {0}")]
    UnknownOrder(String),
}

/// Operations the saga needs from a payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a gateway order for `amount` minor units.
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    async fn fetch_order(&self, gateway_order_ref: &str) -> Result<GatewayOrder, GatewayError>;

    /// Payment attempts made against a gateway order, oldest first.
    async fn fetch_payments(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError>;
}
