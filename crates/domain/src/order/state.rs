//! Order payment, fulfillment and refund states.

use serde::{Deserialize, Serialize};

/// Payment state of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Authorized ──► Paid
///    │            │
///    └────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// A residual amount is owed to the gateway.
    #[default]
    Pending,

    /// The gateway authorized a payment that is not yet captured.
    Authorized,

    /// Fully paid (terminal state).
    Paid,

    /// Payment abandoned or failed; the reservation was compensated (terminal state).
    Failed,
}

impl PaymentStatus {
    /// Returns true if the order may move from this state to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized) | (Pending, Paid) | (Authorized, Paid) | (Pending, Failed)
                | (Authorized, Failed)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Fulfillment state of an order.
///
/// State transitions:
/// ```text
/// Placed ──► Processing ──► Shipped ──► Delivered ──► Returned
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl FulfillmentStatus {
    /// Returns true if the order can still be cancelled by the buyer.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Placed | FulfillmentStatus::Processing
        )
    }

    /// Returns true if fulfillment may advance from this state to `next`.
    ///
    /// Cancellation is not an advance; it goes through the cancellation flows.
    pub fn can_advance_to(&self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Placed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Delivered, Returned)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Cancelled | FulfillmentStatus::Returned
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Placed => "placed",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
            FulfillmentStatus::Returned => "returned",
        }
    }
}

/// Refund state of the gateway-paid part of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    NotApplicable,
    /// A gateway refund is owed and awaits the gateway's confirmation.
    Pending,
    Refunded,
}

impl RefundStatus {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::NotApplicable => "not_applicable",
            RefundStatus::Pending => "pending",
            RefundStatus::Refunded => "refunded",
        }
    }
}

text_enum!(PaymentStatus, "payment", [Pending, Authorized, Paid, Failed]);
text_enum!(
    FulfillmentStatus,
    "fulfillment",
    [Placed, Processing, Shipped, Delivered, Cancelled, Returned]
);
text_enum!(RefundStatus, "refund", [NotApplicable, Pending, Refunded]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_moves_forward_only() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Authorized));
        assert!(Pending.can_transition_to(Paid));
        assert!(Authorized.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Authorized));
        assert!(!Authorized.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Paid));
    }

    #[test]
    fn test_only_unpaid_orders_can_fail() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Failed));
        assert!(Authorized.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Failed));
    }

    #[test]
    fn test_fulfillment_advances() {
        use FulfillmentStatus::*;
        assert!(Placed.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Shipped));
        assert!(Shipped.can_advance_to(Delivered));
        assert!(Delivered.can_advance_to(Returned));
        assert!(!Placed.can_advance_to(Delivered));
        assert!(!Cancelled.can_advance_to(Processing));
        assert!(!Placed.can_advance_to(Cancelled));
    }

    #[test]
    fn test_can_cancel_before_shipping() {
        use FulfillmentStatus::*;
        assert!(Placed.can_cancel());
        assert!(Processing.can_cancel());
        assert!(!Shipped.can_cancel());
        assert!(!Delivered.can_cancel());
        assert!(!Cancelled.can_cancel());
    }

    #[test]
    fn test_text_roundtrip() {
        for status in [
            FulfillmentStatus::Placed,
            FulfillmentStatus::Shipped,
            FulfillmentStatus::Returned,
        ] {
            assert_eq!(status.to_string().parse::<FulfillmentStatus>().unwrap(), status);
        }
        assert_eq!("not_applicable".parse::<RefundStatus>().unwrap(), RefundStatus::NotApplicable);
        assert!("bogus".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_serialization_is_snake_case() {
        let json = serde_json::to_string(&RefundStatus::NotApplicable).unwrap();
        assert_eq!(json, "\"not_applicable\"");
        let status: PaymentStatus = serde_json::from_str("\"authorized\"").unwrap();
        assert_eq!(status, PaymentStatus::Authorized);
    }
}
