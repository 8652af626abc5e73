use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, ProductId, SellerId, UserId, WalletTxId};
use domain::settlement::{self, Settlement, Transition};
use domain::{
    Compensation, FulfillmentStatus, IntentStatus, Money, Order, PaymentIntent, WalletTransaction,
};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    LedgerError, Result,
    store::{
        LedgerStore, NewReservation, Product, Reservation, SettlementOutcome,
        build_reservation, cancellation_refund_entry, check_line, gross_of,
        settlement_refund_entry, wallet_to_apply,
    },
};

const PRODUCT_COLUMNS: &str =
    "id, title, seller_id, active, stock, price_minor, final_price_minor";

const ORDER_COLUMNS: &str = "id, buyer_id, items, address, subtotal_minor, tax_total_minor, \
     wallet_applied_minor, amount_due_minor, payment_status, fulfillment_status, refund_status, \
     gateway_payment_ref, cancel_reason, stock_restored, wallet_refunded, tracking, intent_id, \
     created_at, updated_at";

const INTENT_COLUMNS: &str = "id, user_id, purpose, reference_id, amount_minor, currency, \
     gateway_order_ref, gateway_payment_ref, status, expires_at, idempotency_key, meta, \
     created_at, updated_at";

const WALLET_TX_COLUMNS: &str = "id, user_id, tx_type, source, from_wallet, to_wallet, \
     amount_minor, status, triggered_by, note, intent_id, order_id, created_at";

/// Unique index guarding idempotency keys of live and captured intents.
const IDEMPOTENCY_INDEX: &str = "uniq_intent_idempotency_key";

/// PostgreSQL-backed ledger.
///
/// Stock and wallet debits are conditional updates; intent and order
/// transitions lock both rows with `SELECT … FOR UPDATE` for the duration
/// of one transaction.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts or replaces a product's stock record.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, title, seller_id, active, stock, price_minor, final_price_minor)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                seller_id = EXCLUDED.seller_id,
                active = EXCLUDED.active,
                stock = EXCLUDED.stock,
                price_minor = EXCLUDED.price_minor,
                final_price_minor = EXCLUDED.final_price_minor,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.title)
        .bind(product.seller_id.as_uuid())
        .bind(product.active)
        .bind(i64::from(product.stock))
        .bind(product.price.minor_units())
        .bind(product.final_price.minor_units())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sets a wallet balance outright.
    pub async fn set_wallet_balance(&self, user_id: UserId, balance: Money) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, balance_minor) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET balance_minor = EXCLUDED.balance_minor, updated_at = NOW()
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(balance.minor_units())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lock_intent(conn: &mut PgConnection, intent_id: IntentId) -> Result<PaymentIntent> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1 FOR UPDATE"
        ))
        .bind(intent_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(LedgerError::IntentNotFound(intent_id))?;
        row_to_intent(&row)
    }

    async fn lock_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(LedgerError::OrderNotFound(order_id))?;
        row_to_order(&row)
    }

    async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.buyer_id.as_uuid())
        .bind(serde_json::to_value(&order.items)?)
        .bind(serde_json::to_value(&order.address)?)
        .bind(order.subtotal.minor_units())
        .bind(order.tax_total.minor_units())
        .bind(order.wallet_applied.minor_units())
        .bind(order.amount_due.minor_units())
        .bind(order.payment_status.as_str())
        .bind(order.fulfillment_status.as_str())
        .bind(order.refund_status.as_str())
        .bind(&order.gateway_payment_ref)
        .bind(&order.cancel_reason)
        .bind(order.stock_restored)
        .bind(order.wallet_refunded)
        .bind(serde_json::to_value(&order.tracking)?)
        .bind(order.intent_id.map(|id| id.as_uuid()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Writes back the fields an order may change after placement.
    async fn save_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                payment_status = $2,
                fulfillment_status = $3,
                refund_status = $4,
                gateway_payment_ref = $5,
                cancel_reason = $6,
                stock_restored = $7,
                wallet_refunded = $8,
                tracking = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.payment_status.as_str())
        .bind(order.fulfillment_status.as_str())
        .bind(order.refund_status.as_str())
        .bind(&order.gateway_payment_ref)
        .bind(&order.cancel_reason)
        .bind(order.stock_restored)
        .bind(order.wallet_refunded)
        .bind(serde_json::to_value(&order.tracking)?)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_intent(conn: &mut PgConnection, intent: &PaymentIntent) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payment_intents ({INTENT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(intent.id.as_uuid())
        .bind(intent.user_id.as_uuid())
        .bind(intent.purpose.as_str())
        .bind(intent.reference_id)
        .bind(intent.amount.minor_units())
        .bind(&intent.currency)
        .bind(&intent.gateway_order_ref)
        .bind(&intent.gateway_payment_ref)
        .bind(intent.status.as_str())
        .bind(intent.expires_at)
        .bind(&intent.idempotency_key)
        .bind(Value::Object(intent.meta.clone()))
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(IDEMPOTENCY_INDEX)
            {
                return LedgerError::DuplicateIdempotencyKey {
                    key: intent.idempotency_key.clone().unwrap_or_default(),
                };
            }
            LedgerError::Database(e)
        })?;
        Ok(())
    }

    /// Writes back the fields an intent may change after creation.
    async fn save_intent(conn: &mut PgConnection, intent: &PaymentIntent) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_intents SET
                gateway_order_ref = $2,
                gateway_payment_ref = $3,
                status = $4,
                expires_at = $5,
                meta = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(intent.id.as_uuid())
        .bind(&intent.gateway_order_ref)
        .bind(&intent.gateway_payment_ref)
        .bind(intent.status.as_str())
        .bind(intent.expires_at)
        .bind(Value::Object(intent.meta.clone()))
        .bind(intent.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_wallet_tx(conn: &mut PgConnection, tx: &WalletTransaction) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO wallet_transactions ({WALLET_TX_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(tx.id.as_uuid())
        .bind(tx.user_id.as_uuid())
        .bind(tx.tx_type.as_str())
        .bind(tx.source.as_str())
        .bind(tx.from_wallet.as_str())
        .bind(tx.to_wallet.map(|w| w.as_str()))
        .bind(tx.amount.minor_units())
        .bind(tx.status.as_str())
        .bind(tx.triggered_by.as_str())
        .bind(&tx.note)
        .bind(tx.intent_id.map(|id| id.as_uuid()))
        .bind(tx.order_id.map(|id| id.as_uuid()))
        .bind(tx.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Increments stock and credits the wallet. Never sets absolute values.
    async fn restore(
        conn: &mut PgConnection,
        user_id: UserId,
        compensation: &Compensation,
    ) -> Result<()> {
        for line in &compensation.restock {
            sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                .bind(line.product_id.as_str())
                .bind(i64::from(line.quantity))
                .execute(&mut *conn)
                .await?;
        }

        if compensation.wallet_credit.is_positive() {
            sqlx::query(
                r#"
                INSERT INTO wallets (user_id, balance_minor) VALUES ($1, $2)
                ON CONFLICT (user_id) DO UPDATE
                SET balance_minor = wallets.balance_minor + EXCLUDED.balance_minor, updated_at = NOW()
                "#,
            )
            .bind(user_id.as_uuid())
            .bind(compensation.wallet_credit.minor_units())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn wallet_balance(&self, user_id: UserId) -> Result<Money> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_minor FROM wallets WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(Money::from_minor(balance.unwrap_or(0)))
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn intent(&self, id: IntentId) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_intent).transpose()
    }

    async fn intent_by_gateway_order(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE gateway_order_ref = $1"
        ))
        .bind(gateway_order_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_intent).transpose()
    }

    async fn intent_for_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents \
             WHERE user_id = $1 AND idempotency_key = $2 \
             AND status IN ('created', 'authorized', 'captured')"
        ))
        .bind(user_id.as_uuid())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_intent).transpose()
    }

    async fn wallet_transactions(&self, user_id: UserId) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {WALLET_TX_COLUMNS} FROM wallet_transactions \
             WHERE user_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_wallet_tx).collect()
    }

    async fn commit_reservation(&self, reservation: NewReservation) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Lock products in a stable order so concurrent buyers cannot deadlock.
        let lines = &reservation.lines;
        let mut lock_order: Vec<usize> = (0..lines.len()).collect();
        lock_order.sort_by(|&a, &b| lines[a].product_id.cmp(&lines[b].product_id));

        let mut items = vec![None; lines.len()];
        for index in lock_order {
            let line = &lines[index];
            let row = sqlx::query(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
            ))
            .bind(line.product_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            let product = row.as_ref().map(row_to_product).transpose()?;
            items[index] = Some(check_line(line, product.as_ref())?);

            let updated = sqlx::query(
                "UPDATE products SET stock = stock - $2, updated_at = NOW() \
                 WHERE id = $1 AND active AND stock >= $2",
            )
            .bind(line.product_id.as_str())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(LedgerError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    available: product.map(|p| p.stock).unwrap_or(0),
                });
            }
        }
        let items: Vec<_> = items.into_iter().flatten().collect();

        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_minor FROM wallets WHERE user_id = $1")
                .bind(reservation.buyer_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let balance = Money::from_minor(balance.unwrap_or(0));
        let wallet_applied = wallet_to_apply(
            reservation.use_wallet,
            balance,
            gross_of(&items, reservation.tax_total),
        );

        if wallet_applied.is_positive() {
            let updated = sqlx::query(
                "UPDATE wallets SET balance_minor = balance_minor - $2, updated_at = NOW() \
                 WHERE user_id = $1 AND balance_minor >= $2",
            )
            .bind(reservation.buyer_id.as_uuid())
            .bind(wallet_applied.minor_units())
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(LedgerError::InsufficientBalance {
                    requested: wallet_applied,
                    available: balance,
                });
            }
        }

        let built = build_reservation(&reservation, items, wallet_applied, now)?;

        Self::insert_order(&mut tx, &built.order).await?;
        Self::insert_intent(&mut tx, &built.intent).await?;
        if let Some(wallet_tx) = &built.wallet_transaction {
            Self::insert_wallet_tx(&mut tx, wallet_tx).await?;
        }

        tx.commit().await?;

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
        gateway_payload: Value,
    ) -> Result<PaymentIntent> {
        let mut tx = self.pool.begin().await?;
        let mut intent = Self::lock_intent(&mut tx, intent_id).await?;

        if intent.status != IntentStatus::Created || intent.gateway_order_ref.is_some() {
            return Err(LedgerError::Fenced {
                intent_id,
                status: intent.status,
            });
        }

        intent.gateway_order_ref = Some(gateway_order_ref.to_string());
        intent.expires_at = expires_at;
        intent.annotate("gateway_order", gateway_payload, Utc::now());
        Self::save_intent(&mut tx, &intent).await?;

        tx.commit().await?;
        Ok(intent)
    }

    async fn apply_settlement(
        &self,
        intent_id: IntentId,
        settlement: &Settlement,
    ) -> Result<SettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut intent = Self::lock_intent(&mut tx, intent_id).await?;
        let mut order = match intent.order_id() {
            Some(order_id) => Some(Self::lock_order(&mut tx, order_id).await?),
            None => None,
        };

        let now = Utc::now();
        let transition = settlement::apply(&mut intent, order.as_mut(), settlement, now)?;

        if matches!(transition, Transition::Duplicate { .. }) {
            tx.rollback().await?;
        } else {
            if let (Transition::Applied { compensation, .. }, Some(order)) = (&transition, &order) {
                Self::restore(&mut tx, order.buyer_id, compensation).await?;
                if compensation.wallet_credit.is_positive() {
                    let entry = settlement_refund_entry(
                        &intent,
                        order,
                        compensation.wallet_credit,
                        settlement,
                        now,
                    );
                    Self::insert_wallet_tx(&mut tx, &entry).await?;
                }
            }
            if let Some(order) = &order {
                Self::save_order(&mut tx, order).await?;
            }
            Self::save_intent(&mut tx, &intent).await?;
            tx.commit().await?;
        }

        Ok(SettlementOutcome {
            transition,
            intent,
            order,
        })
    }

    async fn cancel_paid_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, order_id).await?;

        let now = Utc::now();
        let compensation = order.cancel_paid(reason, now)?;
        Self::restore(&mut tx, order.buyer_id, &compensation).await?;
        if compensation.wallet_credit.is_positive() {
            let entry = cancellation_refund_entry(&order, compensation.wallet_credit, reason, now);
            Self::insert_wallet_tx(&mut tx, &entry).await?;
        }
        Self::save_order(&mut tx, &order).await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn advance_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        note: Option<&str>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, order_id).await?;
        order.advance(status, note, Utc::now())?;
        Self::save_order(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn annotate_intent(&self, intent_id: IntentId, key: &str, value: Value) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE payment_intents SET meta = jsonb_set(meta, ARRAY[$2], $3, true), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(intent_id.as_uuid())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::IntentNotFound(intent_id));
        }
        Ok(())
    }

    async fn defer_sweep(&self, intent_id: IntentId, until: DateTime<Utc>) -> Result<()> {
        let updated = sqlx::query("UPDATE payment_intents SET sweep_after = $2 WHERE id = $1")
            .bind(intent_id.as_uuid())
            .bind(until)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::IntentNotFound(intent_id));
        }
        Ok(())
    }

    async fn stale_intents(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PaymentIntent>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents \
             WHERE status IN ('created', 'authorized') AND expires_at <= $1 \
             AND (sweep_after IS NULL OR sweep_after <= $1) \
             ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_intent).collect()
    }
}

fn to_u32(row: &PgRow, column: &'static str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| LedgerError::OutOfRange { column, value })
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::from_minor(row.try_get::<i64, _>(column)?))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        title: row.try_get("title")?,
        seller_id: SellerId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        active: row.try_get("active")?,
        stock: to_u32(row, "stock")?,
        price: money(row, "price_minor")?,
        final_price: money(row, "final_price_minor")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        items: serde_json::from_value(row.try_get("items")?)?,
        address: serde_json::from_value(row.try_get("address")?)?,
        subtotal: money(row, "subtotal_minor")?,
        tax_total: money(row, "tax_total_minor")?,
        wallet_applied: money(row, "wallet_applied_minor")?,
        amount_due: money(row, "amount_due_minor")?,
        payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
        fulfillment_status: row.try_get::<String, _>("fulfillment_status")?.parse()?,
        refund_status: row.try_get::<String, _>("refund_status")?.parse()?,
        gateway_payment_ref: row.try_get("gateway_payment_ref")?,
        cancel_reason: row.try_get("cancel_reason")?,
        stock_restored: row.try_get("stock_restored")?,
        wallet_refunded: row.try_get("wallet_refunded")?,
        tracking: serde_json::from_value(row.try_get("tracking")?)?,
        intent_id: row
            .try_get::<Option<Uuid>, _>("intent_id")?
            .map(IntentId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_intent(row: &PgRow) -> Result<PaymentIntent> {
    let meta = match row.try_get::<Value, _>("meta")? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    Ok(PaymentIntent {
        id: IntentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        purpose: row.try_get::<String, _>("purpose")?.parse()?,
        reference_id: row.try_get("reference_id")?,
        amount: money(row, "amount_minor")?,
        currency: row.try_get("currency")?,
        gateway_order_ref: row.try_get("gateway_order_ref")?,
        gateway_payment_ref: row.try_get("gateway_payment_ref")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        expires_at: row.try_get("expires_at")?,
        idempotency_key: row.try_get("idempotency_key")?,
        meta,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_wallet_tx(row: &PgRow) -> Result<WalletTransaction> {
    Ok(WalletTransaction {
        id: WalletTxId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        tx_type: row.try_get::<String, _>("tx_type")?.parse()?,
        source: row.try_get::<String, _>("source")?.parse()?,
        from_wallet: row.try_get::<String, _>("from_wallet")?.parse()?,
        to_wallet: row
            .try_get::<Option<String>, _>("to_wallet")?
            .map(|w| w.parse())
            .transpose()?,
        amount: money(row, "amount_minor")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        triggered_by: row.try_get::<String, _>("triggered_by")?.parse()?,
        note: row.try_get("note")?,
        intent_id: row
            .try_get::<Option<Uuid>, _>("intent_id")?
            .map(IntentId::from_uuid),
        order_id: row
            .try_get::<Option<Uuid>, _>("order_id")?
            .map(OrderId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}
