//! Domain error types.

use common::{IntentId, OrderId};
use thiserror::Error;

use crate::order::OrderError;

/// A stored status string that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order rules.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The order handed to a settlement is not the one the intent references.
    #[error("Intent {intent_id} does not reference order {order_id}")]
    ReferenceMismatch {
        intent_id: IntentId,
        order_id: OrderId,
    },

    /// The intent is still open but its order already left the payable states.
    #[error("Order {order_id} is {payment_status} while intent {intent_id} is still open")]
    InconsistentOrder {
        intent_id: IntentId,
        order_id: OrderId,
        payment_status: crate::order::PaymentStatus,
    },
}
