//! Settlement of payment outcomes reported by any channel.
//!
//! Webhooks, signed client proofs, the status poll and the sweeper all end up
//! in [`SettlementHandler::settle`], which hands the outcome to the ledger's
//! locked state machine and then does the post-commit work: the commission
//! event, metrics, and the alarm for captures that arrive too late.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, UserId};
use domain::settlement::{Channel, Settlement, SettlementAction, Transition};
use domain::{IntentStatus, PaymentIntent};
use ledger::{LedgerStore, SettlementOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::compensator::Compensator;
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::events::{CommissionEvent, CommissionSink};
use crate::gateway::{
    GatewayOrder, GatewayOrderStatus, GatewayPayment, GatewayPaymentStatus, PaymentGateway,
};
use crate::signature;

/// What happened to a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Applied,
    Duplicate,
    Conflict,
    /// Unknown event or gateway order; acknowledged so the gateway stops retrying.
    Ignored,
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub event: String,
    pub status: WebhookStatus,
    pub intent_id: Option<IntentId>,
}

impl WebhookAck {
    fn ignored(event: String) -> Self {
        Self {
            event,
            status: WebhookStatus::Ignored,
            intent_id: None,
        }
    }
}

/// Result of a client payment proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentVerification {
    pub intent_id: IntentId,
    pub order_id: Option<OrderId>,
    pub status: IntentStatus,
    /// True when this call moved the intent; false when another channel got there first.
    pub applied: bool,
}

/// Decision of the order status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollDecision {
    Success,
    Fail,
    Wait,
}

impl PollDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollDecision::Success => "SUCCESS",
            PollDecision::Fail => "FAIL",
            PollDecision::Wait => "WAIT",
        }
    }
}

/// Answer to an order status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCheck {
    pub decision: PollDecision,
    pub reason: String,
    pub order_status: GatewayOrderStatus,
    pub age_seconds: i64,
    pub intent_id: IntentId,
    /// Intent status after the decision was acted on.
    pub intent_status: IntentStatus,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<Entity<PaymentEntity>>,
    refund: Option<Entity<RefundEntity>>,
}

#[derive(Debug, Deserialize)]
struct Entity<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundEntity {
    id: String,
}

/// Applies payment outcomes to intents and orders.
#[derive(Clone)]
pub struct SettlementHandler<L> {
    ledger: L,
    gateway: Arc<dyn PaymentGateway>,
    compensator: Compensator<L>,
    sink: Arc<dyn CommissionSink>,
    config: SagaConfig,
}

impl<L: LedgerStore + Clone + 'static> SettlementHandler<L> {
    pub fn new(
        ledger: L,
        gateway: Arc<dyn PaymentGateway>,
        compensator: Compensator<L>,
        sink: Arc<dyn CommissionSink>,
        config: SagaConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            compensator,
            sink,
            config,
        }
    }

    /// Applies one outcome through the ledger and does the post-commit work.
    ///
    /// Failure outcomes go through the compensator so they get its retries.
    pub async fn settle(
        &self,
        intent_id: IntentId,
        settlement: Settlement,
    ) -> Result<SettlementOutcome> {
        let channel = settlement.channel;
        let outcome = if matches!(settlement.action, SettlementAction::Fail { .. }) {
            self.compensator.compensate(intent_id, settlement).await?
        } else {
            self.ledger.apply_settlement(intent_id, &settlement).await?
        };

        metrics::counter!(
            "settlements_applied_total",
            "channel" => channel.as_str(),
            "outcome" => outcome.transition.label()
        )
        .increment(1);

        match &outcome.transition {
            Transition::Applied {
                to: IntentStatus::Captured,
                ..
            } => {
                tracing::info!(%intent_id, channel = channel.as_str(), "Payment captured");
                if let Some(order) = &outcome.order {
                    self.sink.publish(CommissionEvent::order_paid(order, Utc::now()));
                }
            }
            Transition::Applied { from, to, .. } => {
                tracing::info!(%intent_id, channel = channel.as_str(), %from, %to, "Intent settled");
            }
            transition if transition.is_late_capture() => {
                metrics::counter!("settlement_inconsistencies_total").increment(1);
                tracing::error!(
                    %intent_id,
                    channel = channel.as_str(),
                    status = %transition.status(),
                    gateway_payment_ref = ?outcome.intent.gateway_payment_ref,
                    "Capture arrived for a closed intent; manual refund required"
                );
            }
            transition => {
                tracing::debug!(%intent_id, channel = channel.as_str(), outcome = transition.label(), status = %transition.status(), "Settlement had no effect");
            }
        }

        Ok(outcome)
    }

    /// Handles a gateway webhook.
    ///
    /// The signature is checked over the raw body before anything is parsed.
    #[tracing::instrument(skip_all)]
    pub async fn handle_webhook(&self, body: &[u8], signature_hex: Option<&str>) -> Result<WebhookAck> {
        let verified = signature_hex.is_some_and(|sig| {
            signature::verify(self.config.webhook_secret.reveal(), body, sig)
        });
        if !verified {
            metrics::counter!("webhook_signature_failures_total").increment(1);
            tracing::warn!("Rejected webhook with missing or invalid signature");
            return Err(SagaError::InvalidSignature);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| SagaError::InvalidPayload(e.to_string()))?;
        let event = envelope.event;

        if !matches!(
            event.as_str(),
            "payment.authorized" | "payment.captured" | "payment.failed" | "refund.processed"
        ) {
            tracing::debug!(%event, "Ignoring webhook event");
            return Ok(WebhookAck::ignored(event));
        }

        let payment = envelope
            .payload
            .payment
            .map(|p| p.entity)
            .ok_or_else(|| SagaError::InvalidPayload("missing payment entity".into()))?;
        let Some(gateway_order_ref) = payment.order_id.as_deref() else {
            return Err(SagaError::InvalidPayload("payment has no order_id".into()));
        };

        let Some(intent) = self.ledger.intent_by_gateway_order(gateway_order_ref).await? else {
            tracing::warn!(%event, gateway_order_ref, "Webhook for unknown gateway order");
            return Ok(WebhookAck::ignored(event));
        };

        let settlement = match event.as_str() {
            "payment.authorized" => Settlement::authorize(Channel::Webhook, Some(payment.id)),
            "payment.captured" => Settlement::capture(Channel::Webhook, Some(payment.id)),
            "payment.failed" => Settlement::fail(
                Channel::Webhook,
                payment
                    .error_description
                    .unwrap_or_else(|| "payment failed at gateway".to_string()),
            ),
            _ => Settlement::refund(
                Channel::Webhook,
                envelope.payload.refund.map(|r| r.entity.id),
            ),
        };

        let outcome = self.settle(intent.id, settlement).await?;
        let status = match outcome.transition {
            Transition::Applied { .. } => WebhookStatus::Applied,
            Transition::Duplicate { .. } => WebhookStatus::Duplicate,
            Transition::Conflict { .. } => WebhookStatus::Conflict,
        };

        Ok(WebhookAck {
            event,
            status,
            intent_id: Some(intent.id),
        })
    }

    /// Settles a payment the client reports with a gateway-signed proof.
    ///
    /// The signature is checked first; then the intent must exist, belong to
    /// the caller, and carry the presented gateway order reference.
    #[tracing::instrument(skip(self, signature_hex))]
    pub async fn verify_payment(
        &self,
        user_id: UserId,
        intent_id: IntentId,
        gateway_order_ref: &str,
        gateway_payment_ref: &str,
        signature_hex: &str,
    ) -> Result<PaymentVerification> {
        if !signature::verify_payment_proof(
            self.config.key_secret.reveal(),
            gateway_order_ref,
            gateway_payment_ref,
            signature_hex,
        ) {
            tracing::warn!(%intent_id, "Rejected payment proof with invalid signature");
            return Err(SagaError::InvalidSignature);
        }

        let intent = self.owned_intent(user_id, intent_id).await?;
        if intent.gateway_order_ref.as_deref() != Some(gateway_order_ref) {
            tracing::warn!(%intent_id, gateway_order_ref, "Payment proof for a different gateway order");
            return Err(SagaError::ReferenceMismatch);
        }

        let outcome = self
            .settle(
                intent_id,
                Settlement::capture(Channel::ClientProof, Some(gateway_payment_ref.to_string())),
            )
            .await?;

        let status = outcome.intent.status;
        if status != IntentStatus::Captured {
            return Err(SagaError::IntentClosed { intent_id, status });
        }

        Ok(PaymentVerification {
            intent_id,
            order_id: outcome.intent.order_id(),
            status,
            applied: outcome.transition.is_applied(),
        })
    }

    /// Records that the buyer abandoned the payment and releases the reservation.
    ///
    /// Returns the intent's status afterwards; a closed intent is left as is.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_failed(
        &self,
        user_id: UserId,
        intent_id: IntentId,
        reason: &str,
    ) -> Result<IntentStatus> {
        let intent = self.owned_intent(user_id, intent_id).await?;
        if !intent.status.is_live() {
            return Ok(intent.status);
        }

        let outcome = self
            .settle(intent_id, Settlement::fail(Channel::ClientAbandon, reason))
            .await?;
        Ok(outcome.intent.status)
    }

    /// Asks the gateway how a payment is going and acts on a definite answer.
    ///
    /// The decision is stored under `last_verify_status` on the intent.
    #[tracing::instrument(skip(self))]
    pub async fn verify_order_status(
        &self,
        user_id: UserId,
        gateway_order_ref: &str,
    ) -> Result<StatusCheck> {
        let intent = self
            .ledger
            .intent_by_gateway_order(gateway_order_ref)
            .await?
            .ok_or_else(|| SagaError::UnknownGatewayOrder(gateway_order_ref.to_string()))?;
        if intent.user_id != user_id {
            return Err(SagaError::NotOwner);
        }

        let order = self.gateway.fetch_order(gateway_order_ref).await?;
        let payments = self.gateway.fetch_payments(gateway_order_ref).await?;
        let now = Utc::now();
        let (decision, reason) = classify(&order, &payments, now, self.config.status_poll_timeout);
        let age_seconds = (now - order.created_at).num_seconds();

        self.ledger
            .annotate_intent(
                intent.id,
                "last_verify_status",
                json!({
                    "decision": decision.as_str(),
                    "order_status": order.status.as_str(),
                    "age_seconds": age_seconds,
                    "checked_at": now.to_rfc3339(),
                }),
            )
            .await?;

        let intent_status = match decision {
            PollDecision::Success => {
                let payment_ref = payments
                    .iter()
                    .find(|p| p.status == GatewayPaymentStatus::Captured)
                    .map(|p| p.id.clone());
                self.settle(intent.id, Settlement::capture(Channel::StatusPoll, payment_ref))
                    .await?
                    .intent
                    .status
            }
            PollDecision::Fail if intent.status.is_live() => {
                self.settle(intent.id, Settlement::fail(Channel::StatusPoll, reason.as_str()))
                    .await?
                    .intent
                    .status
            }
            _ => intent.status,
        };

        Ok(StatusCheck {
            decision,
            reason,
            order_status: order.status,
            age_seconds,
            intent_id: intent.id,
            intent_status,
        })
    }

    async fn owned_intent(&self, user_id: UserId, intent_id: IntentId) -> Result<PaymentIntent> {
        let intent = self
            .ledger
            .intent(intent_id)
            .await?
            .ok_or(SagaError::IntentNotFound(intent_id))?;
        if intent.user_id != user_id {
            return Err(SagaError::NotOwner);
        }
        Ok(intent)
    }
}

/// Decides what a gateway order's payments say about the payment.
pub fn classify(
    order: &GatewayOrder,
    payments: &[GatewayPayment],
    now: DateTime<Utc>,
    timeout: chrono::Duration,
) -> (PollDecision, String) {
    if order.status == GatewayOrderStatus::Paid
        || payments
            .iter()
            .any(|p| p.status == GatewayPaymentStatus::Captured)
    {
        return (PollDecision::Success, "payment captured".to_string());
    }

    if !payments.is_empty()
        && payments
            .iter()
            .all(|p| p.status == GatewayPaymentStatus::Failed)
    {
        return (PollDecision::Fail, "all payment attempts failed".to_string());
    }

    if payments
        .iter()
        .any(|p| p.status == GatewayPaymentStatus::Authorized)
    {
        return (
            PollDecision::Wait,
            "payment authorized, awaiting capture".to_string(),
        );
    }

    if now - order.created_at > timeout {
        return (
            PollDecision::Fail,
            format!(
                "no successful payment within {} seconds",
                timeout.num_seconds()
            ),
        );
    }

    (PollDecision::Wait, "awaiting payment".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn gateway_order(status: GatewayOrderStatus, age_secs: i64) -> GatewayOrder {
        GatewayOrder {
            id: "order_1".into(),
            amount: 1_000,
            currency: "INR".into(),
            receipt: "rcpt".into(),
            status,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn payment(status: GatewayPaymentStatus) -> GatewayPayment {
        GatewayPayment {
            id: "pay_1".into(),
            order_id: "order_1".into(),
            status,
            amount: 1_000,
        }
    }

    fn decide(order: GatewayOrder, payments: &[GatewayPayment]) -> PollDecision {
        classify(&order, payments, Utc::now(), Duration::seconds(120)).0
    }

    #[test]
    fn test_captured_is_success() {
        assert_eq!(
            decide(
                gateway_order(GatewayOrderStatus::Attempted, 5),
                &[payment(GatewayPaymentStatus::Failed), payment(GatewayPaymentStatus::Captured)]
            ),
            PollDecision::Success
        );
        assert_eq!(decide(gateway_order(GatewayOrderStatus::Paid, 5), &[]), PollDecision::Success);
    }

    #[test]
    fn test_all_failed_is_fail() {
        assert_eq!(
            decide(
                gateway_order(GatewayOrderStatus::Attempted, 5),
                &[payment(GatewayPaymentStatus::Failed), payment(GatewayPaymentStatus::Failed)]
            ),
            PollDecision::Fail
        );
    }

    #[test]
    fn test_no_attempts_waits_until_timeout() {
        assert_eq!(decide(gateway_order(GatewayOrderStatus::Created, 5), &[]), PollDecision::Wait);
        assert_eq!(decide(gateway_order(GatewayOrderStatus::Created, 300), &[]), PollDecision::Fail);
    }

    #[test]
    fn test_authorized_waits_even_when_old() {
        assert_eq!(
            decide(
                gateway_order(GatewayOrderStatus::Attempted, 300),
                &[payment(GatewayPaymentStatus::Authorized)]
            ),
            PollDecision::Wait
        );
    }

    #[test]
    fn test_decision_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&PollDecision::Success).unwrap(), "\"SUCCESS\"");
    }
}
