//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{ProductId, SellerId, UserId};
use domain::settlement::{Channel, Settlement};
use domain::{
    AddressSnapshot, FulfillmentStatus, IntentStatus, Money, PaymentStatus, WalletTxType,
};
use ledger::{LedgerError, LedgerStore, NewReservation, PgLedger, Product, ReservationLine};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_ledger_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh ledger with its own pool, cleared tables and one seeded product
async fn get_test_ledger(stock: u32, price: i64) -> PgLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products, wallets, orders, payment_intents, wallet_transactions")
        .execute(&pool)
        .await
        .unwrap();

    let ledger = PgLedger::new(pool);
    ledger
        .upsert_product(&Product {
            id: ProductId::new("SKU-1"),
            title: "Desk lamp".into(),
            seller_id: SellerId::new(),
            active: true,
            stock,
            price: Money::from_minor(price),
            final_price: Money::from_minor(price),
        })
        .await
        .unwrap();
    ledger
}

fn reservation(buyer_id: UserId, quantity: u32, tax: i64, use_wallet: bool) -> NewReservation {
    NewReservation {
        buyer_id,
        lines: vec![ReservationLine {
            product_id: ProductId::new("SKU-1"),
            quantity,
        }],
        address: AddressSnapshot {
            name: "Asha".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "KA".into(),
            postal_code: "560001".into(),
            phone: "9000000000".into(),
        },
        tax_total: Money::from_minor(tax),
        use_wallet,
        currency: "INR".into(),
        hold_window: Duration::minutes(30),
        idempotency_key: None,
    }
}

async fn stock(ledger: &PgLedger) -> u32 {
    ledger
        .product(&ProductId::new("SKU-1"))
        .await
        .unwrap()
        .unwrap()
        .stock
}

#[tokio::test]
async fn reservation_round_trips_through_rows() {
    let ledger = get_test_ledger(10, 1_000).await;
    let buyer = UserId::new();
    ledger
        .set_wallet_balance(buyer, Money::from_minor(200))
        .await
        .unwrap();

    let reserved = ledger
        .commit_reservation(reservation(buyer, 1, 50, true))
        .await
        .unwrap();

    let order = ledger.order(reserved.order.id).await.unwrap().unwrap();
    assert_eq!(order.amount_due, Money::from_minor(850));
    assert_eq!(order.address.city, "Bengaluru");
    assert_eq!(order.intent_id, Some(reserved.intent.id));

    let intent = ledger.intent(reserved.intent.id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Created);
    assert_eq!(intent.order_id(), Some(order.id));

    assert_eq!(stock(&ledger).await, 9);
    assert_eq!(ledger.wallet_balance(buyer).await.unwrap(), Money::zero());
    let txs = ledger.wallet_transactions(buyer).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].tx_type, WalletTxType::Spend);
}

#[tokio::test]
async fn concurrent_buyers_cannot_oversell() {
    let ledger = get_test_ledger(1, 500).await;

    let a = ledger.clone();
    let b = ledger.clone();
    let (first, second) = tokio::join!(
        a.commit_reservation(reservation(UserId::new(), 1, 0, false)),
        b.commit_reservation(reservation(UserId::new(), 1, 0, false)),
    );

    let successes = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(stock(&ledger).await, 0);
}

#[tokio::test]
async fn duplicate_idempotency_key_is_rejected_by_index() {
    let ledger = get_test_ledger(10, 500).await;
    let buyer = UserId::new();
    let mut request = reservation(buyer, 1, 0, false);
    request.idempotency_key = Some("checkout-1".into());

    ledger.commit_reservation(request.clone()).await.unwrap();
    let err = ledger.commit_reservation(request).await.unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateIdempotencyKey { .. }));
    assert_eq!(stock(&ledger).await, 9);
}

#[tokio::test]
async fn failure_settlement_compensates_once() {
    let ledger = get_test_ledger(5, 500).await;
    let buyer = UserId::new();
    ledger
        .set_wallet_balance(buyer, Money::from_minor(300))
        .await
        .unwrap();
    let reserved = ledger
        .commit_reservation(reservation(buyer, 2, 0, true))
        .await
        .unwrap();

    let settlement = Settlement::fail(Channel::IntentManager, "gateway unavailable");
    let first = ledger
        .apply_settlement(reserved.intent.id, &settlement)
        .await
        .unwrap();
    let second = ledger
        .apply_settlement(reserved.intent.id, &settlement)
        .await
        .unwrap();

    assert!(first.transition.is_applied());
    assert!(!second.transition.is_applied());
    assert_eq!(stock(&ledger).await, 5);
    assert_eq!(
        ledger.wallet_balance(buyer).await.unwrap(),
        Money::from_minor(300)
    );

    let order = ledger.order(reserved.order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Cancelled);
    assert!(order.stock_restored && order.wallet_refunded);

    let refunds = ledger
        .wallet_transactions(buyer)
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.tx_type == WalletTxType::Refund)
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test]
async fn capture_persists_payment_reference() {
    let ledger = get_test_ledger(5, 500).await;
    let reserved = ledger
        .commit_reservation(reservation(UserId::new(), 1, 0, false))
        .await
        .unwrap();
    ledger
        .attach_gateway_order(
            reserved.intent.id,
            "order_pg_1",
            Utc::now() + Duration::minutes(30),
            serde_json::json!({"status": "created"}),
        )
        .await
        .unwrap();

    ledger
        .apply_settlement(
            reserved.intent.id,
            &Settlement::capture(Channel::Webhook, Some("pay_pg_1".into())),
        )
        .await
        .unwrap();

    let intent = ledger
        .intent_by_gateway_order("order_pg_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Captured);
    assert_eq!(intent.gateway_payment_ref.as_deref(), Some("pay_pg_1"));
    assert_eq!(intent.meta["gateway_order"]["status"], "created");

    let order = ledger.order(reserved.order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn annotate_and_stale_scan() {
    let ledger = get_test_ledger(5, 500).await;
    let reserved = ledger
        .commit_reservation(reservation(UserId::new(), 1, 0, false))
        .await
        .unwrap();

    ledger
        .annotate_intent(reserved.intent.id, "last_verify_status", "WAIT".into())
        .await
        .unwrap();
    let intent = ledger.intent(reserved.intent.id).await.unwrap().unwrap();
    assert_eq!(intent.meta["last_verify_status"], "WAIT");

    assert!(ledger.stale_intents(Utc::now(), 50).await.unwrap().is_empty());
    let stale = ledger
        .stale_intents(Utc::now() + Duration::minutes(50), 50)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, reserved.intent.id);

    let later = Utc::now() + Duration::minutes(50);
    ledger
        .defer_sweep(reserved.intent.id, later + Duration::minutes(10))
        .await
        .unwrap();
    assert!(ledger.stale_intents(later, 50).await.unwrap().is_empty());
    assert_eq!(
        ledger
            .stale_intents(later + Duration::minutes(10), 50)
            .await
            .unwrap()
            .len(),
        1
    );
}
