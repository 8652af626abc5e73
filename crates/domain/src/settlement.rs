//! The settlement state machine.
//!
//! [`apply`] is the only place where intent status and order payment status
//! change after placement. Storage backends call it with both records loaded
//! under lock, persist whatever it leaves behind, and carry out the returned
//! [`Compensation`] in the same transaction. Every trigger (webhook, client
//! proof, sweeper, status poll, abandonment, cancellation) goes through it, so
//! duplicate or out-of-order delivery converges on the same terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::DomainError;
use crate::intent::{IntentStatus, PaymentIntent};
use crate::order::{Compensation, FulfillmentStatus, Order, PaymentStatus, RefundStatus};

/// Which path reported the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Webhook,
    ClientProof,
    Sweeper,
    StatusPoll,
    /// The buyer abandoned the payment.
    ClientAbandon,
    /// The gateway order could not be opened.
    IntentManager,
    /// Buyer cancellation of an unpaid order.
    Cancellation,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Webhook => "webhook",
            Channel::ClientProof => "client_proof",
            Channel::Sweeper => "sweeper",
            Channel::StatusPoll => "status_poll",
            Channel::ClientAbandon => "client_abandon",
            Channel::IntentManager => "intent_manager",
            Channel::Cancellation => "cancellation",
        }
    }
}

text_enum!(
    Channel,
    "channel",
    [Webhook, ClientProof, Sweeper, StatusPoll, ClientAbandon, IntentManager, Cancellation]
);

/// Terminal state of an intent whose payment never completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOutcome {
    Failed,
    Expired,
}

impl FailureOutcome {
    pub fn status(&self) -> IntentStatus {
        match self {
            FailureOutcome::Failed => IntentStatus::Failed,
            FailureOutcome::Expired => IntentStatus::Expired,
        }
    }
}

/// The outcome being reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SettlementAction {
    Authorize { payment_ref: Option<String> },
    Capture { payment_ref: Option<String> },
    Fail { outcome: FailureOutcome, reason: String },
    Refund { refund_ref: Option<String> },
}

/// An outcome reported for one intent through one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub channel: Channel,
    pub action: SettlementAction,
}

impl Settlement {
    pub fn authorize(channel: Channel, payment_ref: Option<String>) -> Self {
        Self {
            channel,
            action: SettlementAction::Authorize { payment_ref },
        }
    }

    pub fn capture(channel: Channel, payment_ref: Option<String>) -> Self {
        Self {
            channel,
            action: SettlementAction::Capture { payment_ref },
        }
    }

    pub fn fail(channel: Channel, reason: impl Into<String>) -> Self {
        Self {
            channel,
            action: SettlementAction::Fail {
                outcome: FailureOutcome::Failed,
                reason: reason.into(),
            },
        }
    }

    pub fn expire(channel: Channel, reason: impl Into<String>) -> Self {
        Self {
            channel,
            action: SettlementAction::Fail {
                outcome: FailureOutcome::Expired,
                reason: reason.into(),
            },
        }
    }

    pub fn refund(channel: Channel, refund_ref: Option<String>) -> Self {
        Self {
            channel,
            action: SettlementAction::Refund { refund_ref },
        }
    }

    /// Intent status this settlement drives towards.
    pub fn target(&self) -> IntentStatus {
        match &self.action {
            SettlementAction::Authorize { .. } => IntentStatus::Authorized,
            SettlementAction::Capture { .. } => IntentStatus::Captured,
            SettlementAction::Fail { outcome, .. } => outcome.status(),
            SettlementAction::Refund { .. } => IntentStatus::Refunded,
        }
    }

    /// Failure reason, for failure settlements.
    pub fn reason(&self) -> Option<&str> {
        match &self.action {
            SettlementAction::Fail { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Result of applying a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The intent moved; `compensation` lists effects the store must reverse.
    Applied {
        from: IntentStatus,
        to: IntentStatus,
        compensation: Compensation,
    },
    /// The intent was already in the target state.
    Duplicate { status: IntentStatus },
    /// The intent is in a state the settlement cannot leave from.
    Conflict {
        status: IntentStatus,
        attempted: IntentStatus,
    },
}

impl Transition {
    /// Intent status after the settlement.
    pub fn status(&self) -> IntentStatus {
        match self {
            Transition::Applied { to, .. } => *to,
            Transition::Duplicate { status } | Transition::Conflict { status, .. } => *status,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }

    /// A capture that lost the race against a failure or expiry.
    pub fn is_late_capture(&self) -> bool {
        matches!(
            self,
            Transition::Conflict {
                status: IntentStatus::Failed | IntentStatus::Expired,
                attempted: IntentStatus::Captured,
            }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::Applied { .. } => "applied",
            Transition::Duplicate { .. } => "duplicate",
            Transition::Conflict { .. } => "conflict",
        }
    }
}

/// Applies `settlement` to an intent and the order it settles.
///
/// Callers must hold both records under lock and persist them whatever the
/// result, since a conflict may still annotate the intent. The order, when
/// given, must be the one the intent references.
pub fn apply(
    intent: &mut PaymentIntent,
    order: Option<&mut Order>,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> Result<Transition, DomainError> {
    if let Some(order) = order.as_deref()
        && intent.order_id() != Some(order.id)
    {
        return Err(DomainError::ReferenceMismatch {
            intent_id: intent.id,
            order_id: order.id,
        });
    }

    let from = intent.status;
    let target = settlement.target();

    if from == target {
        return Ok(Transition::Duplicate { status: from });
    }

    if !from.can_transition_to(target) {
        let transition = Transition::Conflict {
            status: from,
            attempted: target,
        };
        if transition.is_late_capture() {
            let payment_ref = match &settlement.action {
                SettlementAction::Capture { payment_ref } => payment_ref.clone(),
                _ => None,
            };
            intent.annotate(
                "late_capture",
                json!({
                    "channel": settlement.channel.as_str(),
                    "payment_ref": payment_ref,
                    "at": now.to_rfc3339(),
                }),
                now,
            );
        }
        return Ok(transition);
    }

    let mut compensation = Compensation::default();

    match &settlement.action {
        SettlementAction::Authorize { payment_ref } => {
            if let Some(order) = order {
                ensure_open(intent, order)?;
                order.payment_status = PaymentStatus::Authorized;
                order.push_tracking("Payment authorized", now);
            }
            if payment_ref.is_some() {
                intent.gateway_payment_ref = payment_ref.clone();
            }
        }
        SettlementAction::Capture { payment_ref } => {
            if let Some(order) = order {
                ensure_open(intent, order)?;
                order.payment_status = PaymentStatus::Paid;
                if payment_ref.is_some() {
                    order.gateway_payment_ref = payment_ref.clone();
                }
                order.push_tracking("Payment captured", now);
            }
            if payment_ref.is_some() {
                intent.gateway_payment_ref = payment_ref.clone();
            }
            intent.annotate("captured_via", settlement.channel.as_str(), now);
        }
        SettlementAction::Fail { reason, .. } => {
            if let Some(order) = order {
                ensure_open(intent, order)?;
                order.payment_status = PaymentStatus::Failed;
                order.fulfillment_status = FulfillmentStatus::Cancelled;
                order.cancel_reason = Some(reason.clone());
                order.push_tracking(format!("Payment failed: {reason}"), now);
                compensation = order.take_compensation();
            }
            intent.annotate("failure_reason", reason.as_str(), now);
            intent.annotate("failed_via", settlement.channel.as_str(), now);
        }
        SettlementAction::Refund { refund_ref } => {
            if let Some(order) = order {
                order.refund_status = RefundStatus::Refunded;
                order.push_tracking("Payment refunded", now);
            }
            if let Some(refund_ref) = refund_ref {
                intent.annotate("refund_ref", refund_ref.as_str(), now);
            }
        }
    }

    intent.status = target;
    intent.updated_at = now;

    Ok(Transition::Applied {
        from,
        to: target,
        compensation,
    })
}

/// A live intent must point at an order that is still waiting for payment.
fn ensure_open(intent: &PaymentIntent, order: &Order) -> Result<(), DomainError> {
    match order.payment_status {
        PaymentStatus::Pending | PaymentStatus::Authorized => Ok(()),
        status => Err(DomainError::InconsistentOrder {
            intent_id: intent.id,
            order_id: order.id,
            payment_status: status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::order::{AddressSnapshot, NewOrder, OrderItem};
    use chrono::Duration;
    use common::{ProductId, SellerId, UserId};

    fn placed(wallet: i64) -> (PaymentIntent, Order) {
        let now = Utc::now();
        let mut order = Order::place(
            NewOrder {
                buyer_id: UserId::new(),
                items: vec![OrderItem {
                    product_id: ProductId::new("SKU-1"),
                    seller_id: SellerId::new(),
                    title: "Lamp".into(),
                    quantity: 2,
                    unit_price: Money::from_minor(600),
                    final_price: Money::from_minor(500),
                }],
                address: AddressSnapshot::default(),
                tax_total: Money::from_minor(50),
                wallet_applied: Money::from_minor(wallet),
            },
            now,
        )
        .unwrap();
        let intent = PaymentIntent::for_order(&order, "INR", now + Duration::minutes(30), None, now);
        order.intent_id = Some(intent.id);
        (intent, order)
    }

    #[test]
    fn test_capture_marks_order_paid() {
        let (mut intent, mut order) = placed(200);
        let settlement = Settlement::capture(Channel::Webhook, Some("pay_1".into()));

        let transition = apply(&mut intent, Some(&mut order), &settlement, Utc::now()).unwrap();

        assert!(transition.is_applied());
        assert_eq!(intent.status, IntentStatus::Captured);
        assert_eq!(intent.gateway_payment_ref.as_deref(), Some("pay_1"));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.gateway_payment_ref.as_deref(), Some("pay_1"));
        assert_eq!(order.tracking.last().unwrap().note, "Payment captured");
        assert_eq!(order.wallet_applied + intent.amount, order.gross_total());
    }

    #[test]
    fn test_repeated_capture_is_duplicate() {
        let (mut intent, mut order) = placed(0);
        let settlement = Settlement::capture(Channel::Webhook, Some("pay_1".into()));
        apply(&mut intent, Some(&mut order), &settlement, Utc::now()).unwrap();
        let tracking_len = order.tracking.len();

        let again = apply(&mut intent, Some(&mut order), &settlement, Utc::now()).unwrap();

        assert_eq!(again, Transition::Duplicate { status: IntentStatus::Captured });
        assert_eq!(order.tracking.len(), tracking_len);
    }

    #[test]
    fn test_authorize_then_capture() {
        let (mut intent, mut order) = placed(0);
        apply(&mut intent, Some(&mut order), &Settlement::authorize(Channel::Webhook, None), Utc::now())
            .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Authorized);

        let transition = apply(
            &mut intent,
            Some(&mut order),
            &Settlement::capture(Channel::ClientProof, Some("pay_2".into())),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            transition,
            Transition::Applied {
                from: IntentStatus::Authorized,
                to: IntentStatus::Captured,
                compensation: Compensation::default(),
            }
        );
    }

    #[test]
    fn test_failure_returns_compensation_once() {
        let (mut intent, mut order) = placed(200);
        let settlement = Settlement::fail(Channel::Sweeper, "no payment attempts");

        let transition = apply(&mut intent, Some(&mut order), &settlement, Utc::now()).unwrap();

        let Transition::Applied { compensation, to, .. } = transition else {
            panic!("expected applied transition");
        };
        assert_eq!(to, IntentStatus::Failed);
        assert_eq!(compensation.restock.len(), 1);
        assert_eq!(compensation.restock[0].quantity, 2);
        assert_eq!(compensation.wallet_credit, Money::from_minor(200));
        assert_eq!(order.payment_status, PaymentStatus::Failed);
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Cancelled);
        assert_eq!(intent.meta["failure_reason"], "no payment attempts");

        let again = apply(&mut intent, Some(&mut order), &settlement, Utc::now()).unwrap();
        assert_eq!(again, Transition::Duplicate { status: IntentStatus::Failed });
    }

    #[test]
    fn test_expiry_after_failure_conflicts() {
        let (mut intent, mut order) = placed(0);
        apply(&mut intent, Some(&mut order), &Settlement::fail(Channel::ClientAbandon, "abandoned"), Utc::now())
            .unwrap();

        let transition = apply(
            &mut intent,
            Some(&mut order),
            &Settlement::expire(Channel::Sweeper, "hold window elapsed"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(
            transition,
            Transition::Conflict {
                status: IntentStatus::Failed,
                attempted: IntentStatus::Expired,
            }
        );
        assert!(!transition.is_late_capture());
    }

    #[test]
    fn test_late_capture_is_recorded_not_applied() {
        let (mut intent, mut order) = placed(200);
        apply(&mut intent, Some(&mut order), &Settlement::fail(Channel::Sweeper, "no attempts"), Utc::now())
            .unwrap();

        let transition = apply(
            &mut intent,
            Some(&mut order),
            &Settlement::capture(Channel::Webhook, Some("pay_late".into())),
            Utc::now(),
        )
        .unwrap();

        assert!(transition.is_late_capture());
        assert_eq!(intent.status, IntentStatus::Failed);
        assert_eq!(order.payment_status, PaymentStatus::Failed);
        assert_eq!(intent.meta["late_capture"]["payment_ref"], "pay_late");
        assert_eq!(intent.meta["late_capture"]["channel"], "webhook");
    }

    #[test]
    fn test_refund_after_capture() {
        let (mut intent, mut order) = placed(0);
        apply(&mut intent, Some(&mut order), &Settlement::capture(Channel::Webhook, None), Utc::now())
            .unwrap();

        let transition = apply(
            &mut intent,
            Some(&mut order),
            &Settlement::refund(Channel::Webhook, Some("rfnd_1".into())),
            Utc::now(),
        )
        .unwrap();

        assert!(transition.is_applied());
        assert_eq!(intent.status, IntentStatus::Refunded);
        assert_eq!(order.refund_status, RefundStatus::Refunded);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(!order.stock_restored);
    }

    #[test]
    fn test_refund_before_capture_conflicts() {
        let (mut intent, mut order) = placed(0);
        let transition = apply(
            &mut intent,
            Some(&mut order),
            &Settlement::refund(Channel::Webhook, None),
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(transition, Transition::Conflict { .. }));
    }

    #[test]
    fn test_wrong_order_is_rejected() {
        let (mut intent, _) = placed(0);
        let (_, mut other) = placed(0);
        let err = apply(
            &mut intent,
            Some(&mut other),
            &Settlement::capture(Channel::Webhook, None),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_live_intent_on_closed_order_is_inconsistent() {
        let (mut intent, mut order) = placed(0);
        order.payment_status = PaymentStatus::Failed;
        let err = apply(
            &mut intent,
            Some(&mut order),
            &Settlement::capture(Channel::Webhook, None),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InconsistentOrder { .. }));
        assert_eq!(intent.status, IntentStatus::Created);
    }
}
