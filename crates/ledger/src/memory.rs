use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, ProductId, UserId};
use domain::settlement::{self, Settlement, Transition};
use domain::{
    Compensation, FulfillmentStatus, IntentStatus, Money, Order, PaymentIntent, WalletTransaction,
};
use tokio::sync::RwLock;

use crate::{
    LedgerError, Result,
    store::{
        LedgerStore, NewReservation, Product, Reservation, SettlementOutcome,
        build_reservation, cancellation_refund_entry, check_line, gross_of,
        settlement_refund_entry, wallet_to_apply,
    },
};

#[derive(Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    wallets: HashMap<UserId, Money>,
    orders: HashMap<OrderId, Order>,
    intents: HashMap<IntentId, PaymentIntent>,
    wallet_transactions: Vec<WalletTransaction>,
    sweep_deferrals: HashMap<IntentId, DateTime<Utc>>,
    fail_on_settlement: bool,
}

impl Tables {
    /// Increments stock and credits the wallet for a compensation.
    fn restore(&mut self, user_id: UserId, compensation: &Compensation) {
        for line in &compensation.restock {
            if let Some(product) = self.products.get_mut(&line.product_id) {
                product.stock += line.quantity;
            }
        }
        if compensation.wallet_credit.is_positive() {
            *self.wallets.entry(user_id).or_default() += compensation.wallet_credit;
        }
    }
}

/// In-memory ledger for tests and local runs.
///
/// All tables sit behind one lock, so holding the write guard for the length
/// of an operation makes it atomic in the same way a database transaction is.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product's stock record.
    pub async fn put_product(&self, product: Product) {
        self.tables
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Sets a wallet balance outright.
    pub async fn set_wallet_balance(&self, user_id: UserId, balance: Money) {
        self.tables.write().await.wallets.insert(user_id, balance);
    }

    /// Makes every subsequent `apply_settlement` fail until switched off.
    pub async fn set_fail_on_settlement(&self, fail: bool) {
        self.tables.write().await.fail_on_settlement = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of stored intents.
    pub async fn intent_count(&self) -> usize {
        self.tables.read().await.intents.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(id).cloned())
    }

    async fn wallet_balance(&self, user_id: UserId) -> Result<Money> {
        Ok(self
            .tables
            .read()
            .await
            .wallets
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn intent(&self, id: IntentId) -> Result<Option<PaymentIntent>> {
        Ok(self.tables.read().await.intents.get(&id).cloned())
    }

    async fn intent_by_gateway_order(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Option<PaymentIntent>> {
        Ok(self
            .tables
            .read()
            .await
            .intents
            .values()
            .find(|i| i.gateway_order_ref.as_deref() == Some(gateway_order_ref))
            .cloned())
    }

    async fn intent_for_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<PaymentIntent>> {
        Ok(self
            .tables
            .read()
            .await
            .intents
            .values()
            .find(|i| {
                i.user_id == user_id
                    && i.idempotency_key.as_deref() == Some(key)
                    && i.status.binds_idempotency_key()
            })
            .cloned())
    }

    async fn wallet_transactions(&self, user_id: UserId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .tables
            .read()
            .await
            .wallet_transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn commit_reservation(&self, reservation: NewReservation) -> Result<Reservation> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(key) = &reservation.idempotency_key {
            let taken = tables.intents.values().any(|i| {
                i.user_id == reservation.buyer_id
                    && i.idempotency_key.as_ref() == Some(key)
                    && i.status.binds_idempotency_key()
            });
            if taken {
                return Err(LedgerError::DuplicateIdempotencyKey { key: key.clone() });
            }
        }

        // Validate everything before touching any table.
        let mut items = Vec::with_capacity(reservation.lines.len());
        let mut wanted: HashMap<&ProductId, u32> = HashMap::new();
        for line in &reservation.lines {
            let product = tables.products.get(&line.product_id);
            items.push(check_line(line, product)?);

            let total = wanted.entry(&line.product_id).or_default();
            *total += line.quantity;
            if let Some(product) = product
                && product.stock < *total
            {
                return Err(LedgerError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: *total,
                    available: product.stock,
                });
            }
        }

        let balance = tables
            .wallets
            .get(&reservation.buyer_id)
            .copied()
            .unwrap_or_default();
        let wallet_applied = wallet_to_apply(
            reservation.use_wallet,
            balance,
            gross_of(&items, reservation.tax_total),
        );
        let built = build_reservation(&reservation, items, wallet_applied, now)?;

        for line in &reservation.lines {
            if let Some(product) = tables.products.get_mut(&line.product_id) {
                product.stock -= line.quantity;
            }
        }
        if wallet_applied.is_positive() {
            *tables.wallets.entry(reservation.buyer_id).or_default() -= wallet_applied;
        }
        if let Some(tx) = &built.wallet_transaction {
            tables.wallet_transactions.push(tx.clone());
        }
        tables.orders.insert(built.order.id, built.order.clone());
        tables.intents.insert(built.intent.id, built.intent.clone());

        tracing::debug!(
            order_id = %built.order.id,
            intent_id = %built.intent.id,
            amount_due = %built.order.amount_due,
            "Reservation committed"
        );
        Ok(built)
    }

    async fn attach_gateway_order(
        &self,
        intent_id: IntentId,
        gateway_order_ref: &str,
        expires_at: DateTime<Utc>,
        gateway_payload: serde_json::Value,
    ) -> Result<PaymentIntent> {
        let mut tables = self.tables.write().await;
        let intent = tables
            .intents
            .get_mut(&intent_id)
            .ok_or(LedgerError::IntentNotFound(intent_id))?;

        if intent.status != IntentStatus::Created || intent.gateway_order_ref.is_some() {
            return Err(LedgerError::Fenced {
                intent_id,
                status: intent.status,
            });
        }

        let now = Utc::now();
        intent.gateway_order_ref = Some(gateway_order_ref.to_string());
        intent.expires_at = expires_at;
        intent.annotate("gateway_order", gateway_payload, now);
        Ok(intent.clone())
    }

    async fn apply_settlement(
        &self,
        intent_id: IntentId,
        settlement: &Settlement,
    ) -> Result<SettlementOutcome> {
        let mut tables = self.tables.write().await;
        if tables.fail_on_settlement {
            return Err(LedgerError::Injected("settlement write failed"));
        }

        let mut intent = tables
            .intents
            .get(&intent_id)
            .cloned()
            .ok_or(LedgerError::IntentNotFound(intent_id))?;
        let mut order = match intent.order_id() {
            Some(order_id) => Some(
                tables
                    .orders
                    .get(&order_id)
                    .cloned()
                    .ok_or(LedgerError::OrderNotFound(order_id))?,
            ),
            None => None,
        };

        let now = Utc::now();
        let transition = settlement::apply(&mut intent, order.as_mut(), settlement, now)?;

        if !matches!(transition, Transition::Duplicate { .. }) {
            if let (Transition::Applied { compensation, .. }, Some(order)) = (&transition, &order) {
                tables.restore(order.buyer_id, compensation);
                if compensation.wallet_credit.is_positive() {
                    let entry = settlement_refund_entry(
                        &intent,
                        order,
                        compensation.wallet_credit,
                        settlement,
                        now,
                    );
                    tables.wallet_transactions.push(entry);
                }
            }
            if let Some(order) = &order {
                tables.orders.insert(order.id, order.clone());
            }
            tables.intents.insert(intent.id, intent.clone());
        }

        Ok(SettlementOutcome {
            transition,
            intent,
            order,
        })
    }

    async fn cancel_paid_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let mut order = tables
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(LedgerError::OrderNotFound(order_id))?;

        let now = Utc::now();
        let compensation = order.cancel_paid(reason, now)?;
        tables.restore(order.buyer_id, &compensation);
        if compensation.wallet_credit.is_positive() {
            let entry = cancellation_refund_entry(&order, compensation.wallet_credit, reason, now);
            tables.wallet_transactions.push(entry);
        }
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn advance_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        note: Option<&str>,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        order.advance(status, note, Utc::now())?;
        Ok(order.clone())
    }

    async fn annotate_intent(
        &self,
        intent_id: IntentId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let intent = tables
            .intents
            .get_mut(&intent_id)
            .ok_or(LedgerError::IntentNotFound(intent_id))?;
        intent.annotate(key, value, Utc::now());
        Ok(())
    }

    async fn defer_sweep(&self, intent_id: IntentId, until: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.intents.contains_key(&intent_id) {
            return Err(LedgerError::IntentNotFound(intent_id));
        }
        tables.sweep_deferrals.insert(intent_id, until);
        Ok(())
    }

    async fn stale_intents(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PaymentIntent>> {
        let tables = self.tables.read().await;
        let deferred = |id: &IntentId| {
            tables
                .sweep_deferrals
                .get(id)
                .is_some_and(|until| *until > now)
        };
        let mut stale: Vec<PaymentIntent> = tables
            .intents
            .values()
            .filter(|i| i.status.is_live() && i.is_expired(now) && !deferred(&i.id))
            .cloned()
            .collect();
        stale.sort_by_key(|i| i.created_at);
        stale.truncate(limit);
        Ok(stale)
    }
}
