//! Payment intent creation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, UserId};
use domain::settlement::{Channel, Transition};
use domain::{IntentStatus, Money, Order, PaymentIntent};
use ledger::{LedgerError, LedgerStore};
use serde::Serialize;

use crate::compensator::Compensator;
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::events::{CommissionEvent, CommissionSink};
use crate::gateway::{GatewayOrder, PaymentGateway};
use crate::reservation::ReservationService;

/// What the buyer needs to start paying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentReceipt {
    pub intent_id: IntentId,
    pub order_id: OrderId,
    /// Absent when the wallet covered the whole order.
    pub gateway_order_ref: Option<String>,
    pub status: IntentStatus,
    pub amount_due: Money,
    pub wallet_applied: Money,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    /// True when an earlier request with the same idempotency key created this intent.
    pub replayed: bool,
}

impl IntentReceipt {
    fn new(intent: &PaymentIntent, order: &Order, replayed: bool) -> Self {
        Self {
            intent_id: intent.id,
            order_id: order.id,
            gateway_order_ref: intent.gateway_order_ref.clone(),
            status: intent.status,
            amount_due: order.amount_due,
            wallet_applied: order.wallet_applied,
            currency: intent.currency.clone(),
            expires_at: intent.expires_at,
            replayed,
        }
    }
}

/// Reserves the cart and opens the matching gateway order.
///
/// The gateway call happens after the reservation committed and outside any
/// ledger transaction. If it fails, the reservation is compensated before the
/// error is returned.
#[derive(Clone)]
pub struct IntentManager<L> {
    ledger: L,
    reservations: ReservationService<L>,
    gateway: Arc<dyn PaymentGateway>,
    compensator: Compensator<L>,
    sink: Arc<dyn CommissionSink>,
    config: SagaConfig,
}

impl<L: LedgerStore + Clone + 'static> IntentManager<L> {
    pub fn new(
        ledger: L,
        reservations: ReservationService<L>,
        gateway: Arc<dyn PaymentGateway>,
        compensator: Compensator<L>,
        sink: Arc<dyn CommissionSink>,
        config: SagaConfig,
    ) -> Self {
        Self {
            ledger,
            reservations,
            gateway,
            compensator,
            sink,
            config,
        }
    }

    /// Creates a payment intent for the buyer's active cart.
    #[tracing::instrument(skip(self, idempotency_key))]
    pub async fn create_intent(
        &self,
        buyer_id: UserId,
        delivery_slug: &str,
        use_wallet: bool,
        idempotency_key: Option<String>,
    ) -> Result<IntentReceipt> {
        if let Some(key) = idempotency_key.as_deref()
            && let Some(receipt) = self.replay(buyer_id, key).await?
        {
            return Ok(receipt);
        }

        let reservation = match self
            .reservations
            .reserve(buyer_id, delivery_slug, use_wallet, idempotency_key.clone())
            .await
        {
            Ok(reservation) => reservation,
            Err(SagaError::Ledger(LedgerError::DuplicateIdempotencyKey { key })) => {
                // Lost a race with a concurrent request carrying the same key.
                let winner = self.replay(buyer_id, &key).await?;
                return winner.ok_or(SagaError::Ledger(LedgerError::DuplicateIdempotencyKey {
                    key,
                }));
            }
            Err(e) => return Err(e),
        };

        let order = reservation.order;
        let intent = reservation.intent;

        if intent.status == IntentStatus::Captured {
            metrics::counter!("intents_created_total", "funding" => "wallet").increment(1);
            tracing::info!(intent_id = %intent.id, order_id = %order.id, "Order fully paid from wallet");
            self.sink.publish(CommissionEvent::order_paid(&order, Utc::now()));
            return Ok(IntentReceipt::new(&intent, &order, false));
        }

        let gateway_order = match self
            .gateway
            .create_order(
                order.amount_due.minor_units(),
                &intent.currency,
                &intent.id.to_string(),
            )
            .await
        {
            Ok(gateway_order) => gateway_order,
            Err(e) => {
                tracing::warn!(intent_id = %intent.id, error = %e, "Gateway order creation failed");
                return Err(self
                    .roll_back(&intent, &order, format!("gateway order creation failed: {e}"))
                    .await);
            }
        };

        let expires_at = Utc::now() + self.config.hold_window;
        let payload = gateway_order_payload(&gateway_order);
        let intent = match self
            .ledger
            .attach_gateway_order(intent.id, &gateway_order.id, expires_at, payload)
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(intent_id = %intent.id, gateway_order_ref = %gateway_order.id, error = %e, "Failed to store gateway order reference");
                return Err(self
                    .roll_back(&intent, &order, format!("failed to store gateway order: {e}"))
                    .await);
            }
        };

        metrics::counter!("intents_created_total", "funding" => "gateway").increment(1);
        tracing::info!(
            intent_id = %intent.id,
            order_id = %order.id,
            gateway_order_ref = %gateway_order.id,
            amount_due = %order.amount_due,
            "Payment intent created"
        );

        Ok(IntentReceipt::new(&intent, &order, false))
    }

    /// Returns the intent already bound to `key`, if any.
    ///
    /// A live intent without a gateway reference belongs to a request that
    /// has not finished opening its gateway order; the caller has to retry.
    async fn replay(&self, buyer_id: UserId, key: &str) -> Result<Option<IntentReceipt>> {
        let Some(intent) = self
            .ledger
            .intent_for_idempotency_key(buyer_id, key)
            .await?
        else {
            return Ok(None);
        };
        if intent.status.is_live() && intent.gateway_order_ref.is_none() {
            tracing::info!(intent_id = %intent.id, "Idempotent request still opening its gateway order");
            return Err(SagaError::IntentPending {
                intent_id: intent.id,
            });
        }
        let order_id = intent.order_id().ok_or(SagaError::IntentNotFound(intent.id))?;
        let order = self
            .ledger
            .order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;

        metrics::counter!("intents_replayed_total").increment(1);
        tracing::info!(intent_id = %intent.id, "Replaying intent for idempotency key");
        Ok(Some(IntentReceipt::new(&intent, &order, true)))
    }

    /// Compensates a reservation whose gateway order could not be opened.
    async fn roll_back(&self, intent: &PaymentIntent, order: &Order, reason: String) -> SagaError {
        let (rolled_back, wallet_restored) = match self
            .compensator
            .fail(intent.id, Channel::IntentManager, &reason)
            .await
        {
            Ok(outcome) => match outcome.transition {
                Transition::Applied { compensation, .. } => (true, compensation.wallet_credit),
                // Some other channel already closed the intent.
                _ => (!outcome.intent.status.is_live(), Money::zero()),
            },
            Err(_) => (false, Money::zero()),
        };

        let (wallet_applied, amount_due) = if rolled_back {
            (Money::zero(), Money::zero())
        } else {
            (order.wallet_applied, order.amount_due)
        };

        SagaError::GatewayFailed {
            reason,
            order_id: order.id,
            intent_id: intent.id,
            rolled_back,
            wallet_restored,
            wallet_applied,
            amount_due,
        }
    }
}

/// Snapshot of the gateway order kept in the intent's metadata.
fn gateway_order_payload(gateway_order: &GatewayOrder) -> serde_json::Value {
    serde_json::to_value(gateway_order).unwrap_or_else(|e| {
        tracing::warn!(gateway_order_ref = %gateway_order.id, error = %e, "Failed to serialize gateway order");
        serde_json::json!({ "id": gateway_order.id })
    })
}
