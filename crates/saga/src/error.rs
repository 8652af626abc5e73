//! Saga error types.

use common::{IntentId, OrderId};
use domain::{IntentStatus, Money, OrderError};
use ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

use crate::gateway::GatewayError;

/// How a failure should be reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A business rule said no; nothing was committed.
    Domain,
    /// The gateway failed; retryable.
    Integration,
    /// Untrusted or inconsistent input; rejected outright.
    Integrity,
    Internal,
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Delivery address not found: {slug}")]
    AddressNotFound { slug: String },

    /// The intent already reached a state the request cannot change.
    #[error("Payment intent {intent_id} is {status}")]
    IntentClosed {
        intent_id: IntentId,
        status: IntentStatus,
    },

    /// Another request with the same idempotency key is still opening the
    /// gateway order. Retrying later returns the finished intent.
    #[error("Payment intent {intent_id} is still being created; retry shortly")]
    IntentPending { intent_id: IntentId },

    /// Opening the gateway order failed after the reservation committed.
    ///
    /// `rolled_back` tells whether stock and wallet were already restored;
    /// `wallet_restored` is what went back to the wallet. `wallet_applied`
    /// and `amount_due` describe the order as it stands afterwards: both
    /// zero once rolled back, the reserved figures otherwise.
    #[error("Payment gateway failed for order {order_id}: {reason}")]
    GatewayFailed {
        reason: String,
        order_id: OrderId,
        intent_id: IntentId,
        rolled_back: bool,
        wallet_restored: Money,
        wallet_applied: Money,
        amount_due: Money,
    },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Payment intent not found: {0}")]
    IntentNotFound(IntentId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("No payment intent for gateway order {0}")]
    UnknownGatewayOrder(String),

    /// The caller does not own the record.
    #[error("Access denied")]
    NotOwner,

    /// The presented gateway order reference differs from the stored one.
    #[error("Gateway order reference mismatch")]
    ReferenceMismatch,

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A cart or address book call failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl SagaError {
    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::EmptyCart
            | SagaError::AddressNotFound { .. }
            | SagaError::IntentClosed { .. }
            | SagaError::IntentPending { .. }
            | SagaError::Order(_) => ErrorKind::Domain,
            SagaError::GatewayFailed { .. } | SagaError::Gateway(_) => ErrorKind::Integration,
            SagaError::InvalidSignature
            | SagaError::InvalidPayload(_)
            | SagaError::IntentNotFound(_)
            | SagaError::OrderNotFound(_)
            | SagaError::UnknownGatewayOrder(_)
            | SagaError::NotOwner
            | SagaError::ReferenceMismatch => ErrorKind::Integrity,
            SagaError::Ledger(e) if e.is_domain() => ErrorKind::Domain,
            SagaError::Ledger(LedgerError::DuplicateIdempotencyKey { .. })
            | SagaError::Ledger(LedgerError::Fenced { .. }) => ErrorKind::Domain,
            SagaError::Ledger(e) if e.is_not_found() => ErrorKind::Integrity,
            SagaError::Ledger(_) | SagaError::Collaborator(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    #[test]
    fn test_kinds() {
        assert_eq!(SagaError::EmptyCart.kind(), ErrorKind::Domain);
        assert_eq!(SagaError::InvalidSignature.kind(), ErrorKind::Integrity);
        assert_eq!(
            SagaError::IntentPending {
                intent_id: IntentId::new()
            }
            .kind(),
            ErrorKind::Domain
        );
        assert_eq!(
            SagaError::Gateway(GatewayError::Unavailable("down".into())).kind(),
            ErrorKind::Integration
        );
        assert_eq!(
            SagaError::Ledger(LedgerError::InsufficientStock {
                product_id: ProductId::new("SKU-1"),
                requested: 2,
                available: 1,
            })
            .kind(),
            ErrorKind::Domain
        );
        assert_eq!(
            SagaError::Ledger(LedgerError::IntentNotFound(IntentId::new())).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            SagaError::Ledger(LedgerError::Injected("boom")).kind(),
            ErrorKind::Internal
        );
    }
}
