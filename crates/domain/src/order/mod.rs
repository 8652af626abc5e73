//! Order record and related types.

mod model;
mod state;

pub use model::{
    AddressSnapshot, Compensation, NewOrder, Order, OrderItem, StockLine, TrackingUpdate,
};
pub use state::{FulfillmentStatus, PaymentStatus, RefundStatus};

use common::ProductId;
use thiserror::Error;

use crate::money::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity {
        product_id: ProductId,
        quantity: u32,
    },

    /// Wallet amount is negative or larger than what the order costs.
    #[error("Wallet amount {applied} is not within 0..={gross}")]
    InvalidWalletAmount { applied: Money, gross: Money },

    /// Fulfillment has progressed past the point where cancellation is allowed.
    #[error("Order cannot be cancelled while {status}")]
    NotCancellable { status: FulfillmentStatus },

    /// The requested fulfillment step does not follow the current one.
    #[error("Invalid fulfillment transition: {from} -> {to}")]
    InvalidFulfillmentTransition {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },

    /// The operation needs a fully paid order.
    #[error("Order is not paid (payment status {status})")]
    NotPaid { status: PaymentStatus },
}
