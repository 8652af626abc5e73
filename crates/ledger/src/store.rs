use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{IntentId, OrderId, ProductId, SellerId, UserId};
use domain::settlement::{Channel, Settlement, Transition};
use domain::{
    AddressSnapshot, FulfillmentStatus, Money, NewOrder, Order, OrderItem, PaymentIntent,
    TriggeredBy, WalletTransaction,
};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// Stock record for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub seller_id: SellerId,
    pub active: bool,
    pub stock: u32,
    /// List price per unit.
    pub price: Money,
    /// Discounted price per unit.
    pub final_price: Money,
}

/// One cart line to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Everything needed to commit a reservation.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub buyer_id: UserId,
    pub lines: Vec<ReservationLine>,
    pub address: AddressSnapshot,
    pub tax_total: Money,
    pub use_wallet: bool,
    pub currency: String,
    /// How long the intent waits for payment before the sweeper may resolve it.
    pub hold_window: Duration,
    pub idempotency_key: Option<String>,
}

/// Records written by a committed reservation.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub order: Order,
    pub intent: PaymentIntent,
    /// The `spend` entry, when wallet balance was applied.
    pub wallet_transaction: Option<WalletTransaction>,
}

/// Records after a settlement, together with what happened.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub transition: Transition,
    pub intent: PaymentIntent,
    pub order: Option<Order>,
}

/// Durable store for the saga's records.
///
/// Each method is one local atomic unit: it either commits every effect or
/// none. No method ever calls out to the gateway.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Looks up a product's stock record.
    async fn product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Current wallet balance; zero for users without a wallet row.
    async fn wallet_balance(&self, user_id: UserId) -> Result<Money>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn intent(&self, id: IntentId) -> Result<Option<PaymentIntent>>;

    /// Finds the intent a gateway order belongs to.
    async fn intent_by_gateway_order(&self, gateway_order_ref: &str)
    -> Result<Option<PaymentIntent>>;

    /// Finds the live or captured intent holding `key` for `user_id`.
    async fn intent_for_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<PaymentIntent>>;

    /// Wallet entries for a user, oldest first.
    async fn wallet_transactions(&self, user_id: UserId) -> Result<Vec<WalletTransaction>>;

    /// Decrements stock, debits the wallet and writes the order, its intent
    /// and the `spend` entry.
    ///
    /// Stock is taken only while `stock >= quantity` and the product is
    /// active; the wallet only while `balance >= amount`. Any shortfall
    /// aborts the whole reservation.
    async fn commit_reservation(&self, reservation: NewReservation) -> Result<Reservation>;

    /// Stores the gateway order reference on a `created` intent that has none yet.
    async fn attach_gateway_order(
        &self,
        intent_id: IntentId,
        gateway_order_ref: &str,
        expires_at: DateTime<Utc>,
        gateway_payload: serde_json::Value,
    ) -> Result<PaymentIntent>;

    /// Locks the intent and its order, runs the settlement state machine and
    /// persists the result together with any compensation it produced.
    async fn apply_settlement(
        &self,
        intent_id: IntentId,
        settlement: &Settlement,
    ) -> Result<SettlementOutcome>;

    /// Cancels a paid, unshipped order: restock, wallet refund and a pending
    /// refund for the gateway-paid part.
    async fn cancel_paid_order(&self, order_id: OrderId, reason: &str) -> Result<Order>;

    /// Moves fulfillment one step forward.
    async fn advance_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        note: Option<&str>,
    ) -> Result<Order>;

    /// Writes one metadata key. Allowed in any status.
    async fn annotate_intent(
        &self,
        intent_id: IntentId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()>;

    /// Hides an intent from [`LedgerStore::stale_intents`] until `until`.
    ///
    /// The hold window itself is unchanged; this only spaces out sweeps of an
    /// intent the sweeper could not resolve yet.
    async fn defer_sweep(&self, intent_id: IntentId, until: DateTime<Utc>) -> Result<()>;

    /// Live intents whose expiry has passed and whose sweep is not deferred
    /// past `now`, oldest first.
    async fn stale_intents(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PaymentIntent>>;
}

/// Validates one reservation line against its stock record.
pub(crate) fn check_line(line: &ReservationLine, product: Option<&Product>) -> Result<OrderItem> {
    let product = match product {
        Some(product) if product.active => product,
        _ => {
            return Err(LedgerError::ProductUnavailable {
                product_id: line.product_id.clone(),
            });
        }
    };

    if product.stock < line.quantity {
        return Err(LedgerError::InsufficientStock {
            product_id: line.product_id.clone(),
            requested: line.quantity,
            available: product.stock,
        });
    }

    Ok(OrderItem {
        product_id: product.id.clone(),
        seller_id: product.seller_id,
        title: product.title.clone(),
        quantity: line.quantity,
        unit_price: product.price,
        final_price: product.final_price,
    })
}

/// Wallet amount to apply: as much of the gross total as the balance covers.
pub(crate) fn wallet_to_apply(use_wallet: bool, balance: Money, gross: Money) -> Money {
    if use_wallet {
        gross.covered_by(balance)
    } else {
        Money::zero()
    }
}

/// Builds the order, its intent and the optional `spend` entry.
pub(crate) fn build_reservation(
    reservation: &NewReservation,
    items: Vec<OrderItem>,
    wallet_applied: Money,
    now: DateTime<Utc>,
) -> Result<Reservation> {
    let mut order = Order::place(
        NewOrder {
            buyer_id: reservation.buyer_id,
            items,
            address: reservation.address.clone(),
            tax_total: reservation.tax_total,
            wallet_applied,
        },
        now,
    )?;

    let intent = PaymentIntent::for_order(
        &order,
        reservation.currency.clone(),
        now + reservation.hold_window,
        reservation.idempotency_key.clone(),
        now,
    );
    order.intent_id = Some(intent.id);

    let wallet_transaction = wallet_applied.is_positive().then(|| {
        WalletTransaction::spend(order.buyer_id, wallet_applied, order.id, intent.id, now)
    });

    Ok(Reservation {
        order,
        intent,
        wallet_transaction,
    })
}

/// Sum of line totals plus tax, before any wallet is applied.
pub(crate) fn gross_of(items: &[OrderItem], tax_total: Money) -> Money {
    items.iter().map(OrderItem::line_total).sum::<Money>() + tax_total
}

/// The `refund` entry written when a settlement gives wallet funds back.
pub(crate) fn settlement_refund_entry(
    intent: &PaymentIntent,
    order: &Order,
    amount: Money,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> WalletTransaction {
    let triggered_by = match settlement.channel {
        Channel::ClientAbandon | Channel::Cancellation => TriggeredBy::User,
        _ => TriggeredBy::System,
    };
    let note = format!(
        "Refund for order {}: {}",
        order.id,
        settlement.reason().unwrap_or("payment not completed")
    );
    WalletTransaction::refund(
        order.buyer_id,
        amount,
        order.id,
        Some(intent.id),
        note,
        triggered_by,
        now,
    )
}

/// The `refund` entry written when a paid order is cancelled.
pub(crate) fn cancellation_refund_entry(
    order: &Order,
    amount: Money,
    reason: &str,
    now: DateTime<Utc>,
) -> WalletTransaction {
    WalletTransaction::refund(
        order.buyer_id,
        amount,
        order.id,
        order.intent_id,
        format!("Order {} cancelled: {reason}", order.id),
        TriggeredBy::User,
        now,
    )
}
