//! Payment intents: one record per attempt to collect an amount through the gateway.

use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::money::Money;
use crate::order::Order;

/// Lifecycle of a payment intent.
///
/// State transitions:
/// ```text
/// Created ──► Authorized ──► Captured ──► Refunded
///    │            │
///    │            ├──► Failed
///    │            └──► Expired
///    ├──► Captured
///    ├──► Failed
///    └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Reservation committed, waiting for the buyer to pay.
    #[default]
    Created,
    Authorized,
    Captured,
    Failed,
    /// Never reached the gateway, or timed out without an answer.
    Expired,
    /// A captured payment was given back. Moves no stock or wallet funds.
    Refunded,
}

impl IntentStatus {
    /// Returns true if the intent may move from this state to `next`.
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        use IntentStatus::*;
        matches!(
            (self, next),
            (Created, Authorized)
                | (Created, Captured)
                | (Created, Failed)
                | (Created, Expired)
                | (Authorized, Captured)
                | (Authorized, Failed)
                | (Authorized, Expired)
                | (Captured, Refunded)
        )
    }

    /// Returns true if no further financial mutation is permitted.
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    /// Returns true while the outcome is still unknown.
    pub fn is_live(&self) -> bool {
        matches!(self, IntentStatus::Created | IntentStatus::Authorized)
    }

    /// Returns true if an intent in this state keeps its idempotency key reserved.
    pub fn binds_idempotency_key(&self) -> bool {
        self.is_live() || *self == IntentStatus::Captured
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Created => "created",
            IntentStatus::Authorized => "authorized",
            IntentStatus::Captured => "captured",
            IntentStatus::Failed => "failed",
            IntentStatus::Expired => "expired",
            IntentStatus::Refunded => "refunded",
        }
    }
}

/// What an intent pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentPurpose {
    #[default]
    Order,
    WalletTopUp,
}

impl IntentPurpose {
    /// Returns the purpose name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentPurpose::Order => "order",
            IntentPurpose::WalletTopUp => "wallet_top_up",
        }
    }
}

text_enum!(
    IntentStatus,
    "intent",
    [Created, Authorized, Captured, Failed, Expired, Refunded]
);
text_enum!(IntentPurpose, "intent purpose", [Order, WalletTopUp]);

/// The saga's coordination record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: IntentId,
    pub user_id: UserId,
    pub purpose: IntentPurpose,
    /// Id of the payable this intent settles; an order id for `Order` intents.
    pub reference_id: Uuid,
    pub amount: Money,
    pub currency: String,
    pub gateway_order_ref: Option<String>,
    pub gateway_payment_ref: Option<String>,
    pub status: IntentStatus,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    /// Diagnostic payloads; never drives control flow except fences set by
    /// the settlement function itself.
    pub meta: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Creates the intent for a freshly placed order.
    ///
    /// An order the wallet fully covered gets a `captured` intent straight away.
    pub fn for_order(
        order: &Order,
        currency: impl Into<String>,
        expires_at: DateTime<Utc>,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if order.amount_due.is_zero() {
            IntentStatus::Captured
        } else {
            IntentStatus::Created
        };

        Self {
            id: IntentId::new(),
            user_id: order.buyer_id,
            purpose: IntentPurpose::Order,
            reference_id: order.id.as_uuid(),
            amount: order.amount_due,
            currency: currency.into(),
            gateway_order_ref: None,
            gateway_payment_ref: None,
            status,
            expires_at,
            idempotency_key,
            meta: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the order this intent settles, if it settles one.
    pub fn order_id(&self) -> Option<OrderId> {
        match self.purpose {
            IntentPurpose::Order => Some(OrderId::from_uuid(self.reference_id)),
            IntentPurpose::WalletTopUp => None,
        }
    }

    /// Returns true once the hold window has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Records a diagnostic value under `key`, replacing any previous one.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<Value>, now: DateTime<Utc>) {
        self.meta.insert(key.into(), value.into());
        self.updated_at = now;
    }
}
