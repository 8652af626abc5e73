//! Buyer order reads, cancellation and fulfillment updates.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, UserId};
use domain::settlement::{Channel, Settlement};
use domain::{FulfillmentStatus, IntentStatus, Order, OrderError, PaymentStatus};
use ledger::LedgerStore;

use crate::error::{Result, SagaError};
use crate::events::{CommissionEvent, CommissionSink};
use crate::settlement::SettlementHandler;

/// Order operations after placement.
#[derive(Clone)]
pub struct OrderDesk<L> {
    ledger: L,
    settlement: SettlementHandler<L>,
    sink: Arc<dyn CommissionSink>,
}

impl<L: LedgerStore + Clone + 'static> OrderDesk<L> {
    pub fn new(ledger: L, settlement: SettlementHandler<L>, sink: Arc<dyn CommissionSink>) -> Self {
        Self {
            ledger,
            settlement,
            sink,
        }
    }

    /// Returns an order owned by `buyer_id`.
    pub async fn order(&self, buyer_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .ledger
            .order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        if order.buyer_id != buyer_id {
            return Err(SagaError::NotOwner);
        }
        Ok(order)
    }

    /// Cancels an order that has not shipped.
    ///
    /// An unpaid order releases its reservation through the compensator. A
    /// paid order is restocked, its wallet part refunded, and the gateway part
    /// marked as a pending refund.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        buyer_id: UserId,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order> {
        let order = self.order(buyer_id, order_id).await?;
        if !order.fulfillment_status.can_cancel() {
            return Err(OrderError::NotCancellable {
                status: order.fulfillment_status,
            }
            .into());
        }

        let mut paid = order.payment_status == PaymentStatus::Paid;
        if !paid {
            let intent_id = order
                .intent_id
                .ok_or(SagaError::OrderNotFound(order_id))?;
            let outcome = self
                .settlement
                .settle(intent_id, Settlement::fail(Channel::Cancellation, reason))
                .await?;
            // The payment may have been captured while we were deciding.
            paid = outcome.intent.status == IntentStatus::Captured;
            if !paid {
                metrics::counter!("orders_cancelled_total", "payment" => "unpaid").increment(1);
                return outcome.order.ok_or(SagaError::OrderNotFound(order_id));
            }
        }

        let order = self.ledger.cancel_paid_order(order_id, reason).await?;
        metrics::counter!("orders_cancelled_total", "payment" => "paid").increment(1);
        tracing::info!(
            %order_id,
            wallet_refunded = %order.wallet_applied,
            refund_status = %order.refund_status,
            "Paid order cancelled"
        );
        Ok(order)
    }

    /// Moves fulfillment one step forward.
    ///
    /// Reaching `delivered` publishes the commission event.
    #[tracing::instrument(skip(self, note))]
    pub async fn advance_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        note: Option<&str>,
    ) -> Result<Order> {
        let order = self
            .ledger
            .advance_fulfillment(order_id, status, note)
            .await?;

        metrics::counter!("fulfillment_updates_total", "status" => status.as_str()).increment(1);
        tracing::info!(%order_id, %status, "Fulfillment advanced");

        if status == FulfillmentStatus::Delivered {
            self.sink
                .publish(CommissionEvent::order_delivered(&order, Utc::now()));
        }
        Ok(order)
    }
}
