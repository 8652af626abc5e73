//! Domain layer for the order and payment settlement saga.
//!
//! This crate provides the records the saga coordinates and the rules that
//! govern them:
//! - Order with payment, fulfillment and refund states
//! - PaymentIntent, the coordination record for one gateway collection attempt
//! - WalletTransaction, the immutable wallet ledger entry
//! - `settlement::apply`, the single function that moves intents and orders
//!   between payment states
//!
//! Nothing here performs I/O. Storage backends load records, call into this
//! crate, and persist the result inside their own transaction.

/// Implements `Display` and `FromStr` for a status enum on top of its `as_str`.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::error::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::error::UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

pub mod error;
pub mod intent;
pub mod money;
pub mod order;
pub mod settlement;
pub mod wallet;

pub use common::{IntentId, OrderId, ProductId, SellerId, UserId, WalletTxId};
pub use error::{DomainError, UnknownVariant};
pub use intent::{IntentPurpose, IntentStatus, PaymentIntent};
pub use money::Money;
pub use order::{
    AddressSnapshot, Compensation, FulfillmentStatus, NewOrder, Order, OrderError, OrderItem,
    PaymentStatus, RefundStatus, StockLine, TrackingUpdate,
};
pub use settlement::{Channel, FailureOutcome, Settlement, SettlementAction, Transition};
pub use wallet::{
    TriggeredBy, WalletKind, WalletTransaction, WalletTxSource, WalletTxStatus, WalletTxType,
};
