//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{ProductId, SellerId, UserId};
use domain::{AddressSnapshot, Money};
use ledger::{InMemoryLedger, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::signature;
use serde_json::{Value, json};
use tower::ServiceExt;

use api::Sandbox;
use api::config::Config;
use saga::Secret;

const WEBHOOK_SECRET: &str = "whsec_api";
const KEY_SECRET: &str = "key_api";
const SIGNATURE_HEADER: &str = "x-gateway-signature";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    ledger: InMemoryLedger,
    sandbox: Sandbox,
}

impl TestApp {
    async fn new() -> Self {
        let ledger = InMemoryLedger::new();
        ledger
            .put_product(Product {
                id: ProductId::new("SKU-001"),
                title: "Clay teapot".into(),
                seller_id: SellerId::new(),
                active: true,
                stock: 10,
                price: Money::from_minor(1_000),
                final_price: Money::from_minor(1_000),
            })
            .await;

        let config = Config {
            webhook_secret: Secret::new(WEBHOOK_SECRET),
            key_secret: Secret::new(KEY_SECRET),
            ..Config::default()
        };
        let parts = api::create_default_state(ledger.clone(), &config);
        let app = api::create_app(parts.state, get_metrics_handle());

        Self {
            app,
            ledger,
            sandbox: parts.sandbox,
        }
    }

    async fn buyer(&self, wallet: i64) -> UserId {
        let buyer = UserId::new();
        self.sandbox.carts.add(buyer, "SKU-001", 1);
        self.sandbox.carts.set_tax(buyer, Money::from_minor(50));
        self.sandbox
            .addresses
            .insert(buyer, "home", AddressSnapshot::default());
        self.ledger
            .set_wallet_balance(buyer, Money::from_minor(wallet))
            .await;
        buyer
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn post(&self, uri: &str, user: Option<UserId>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str, user: UserId) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn checkout(&self, buyer: UserId, use_wallet: bool) -> Value {
        let (status, json) = self
            .post(
                "/orders/intent",
                Some(buyer),
                json!({ "delivery_slug": "home", "use_wallet": use_wallet }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"].clone()
    }

    async fn webhook(&self, payload: &Value, signature: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/payments/webhook")
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn captured_event(payment_id: &str, gateway_order_ref: &str) -> Value {
    json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": payment_id,
            "order_id": gateway_order_ref,
            "status": "captured",
        }}}
    })
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new().await;
    let (status, json) = t.get("/health", UserId::new()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new().await;
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_checkout_requires_caller() {
    let t = TestApp::new().await;
    let (status, json) = t
        .post("/orders/intent", None, json!({ "delivery_slug": "home" }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_checkout_creates_intent() {
    let t = TestApp::new().await;
    let buyer = t.buyer(200).await;

    let data = t.checkout(buyer, true).await;

    assert_eq!(data["amount_due"], 850);
    assert_eq!(data["wallet_applied"], 200);
    assert_eq!(data["status"], "created");
    assert_eq!(data["currency"], "INR");
    assert!(data["gateway_order_ref"].is_string());
    assert_eq!(data["replayed"], false);
}

#[tokio::test]
async fn test_checkout_replays_idempotency_key() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let body = json!({ "delivery_slug": "home", "idempotency_key": "k-1" });

    let (first_status, first) = t.post("/orders/intent", Some(buyer), body.clone()).await;
    let (second_status, second) = t.post("/orders/intent", Some(buyer), body).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["data"]["replayed"], true);
    assert_eq!(first["data"]["intent_id"], second["data"]["intent_id"]);
}

#[tokio::test]
async fn test_empty_cart_is_unprocessable() {
    let t = TestApp::new().await;
    let (status, json) = t
        .post(
            "/orders/intent",
            Some(UserId::new()),
            json!({ "delivery_slug": "home" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["kind"], "domain");
}

#[tokio::test]
async fn test_gateway_failure_reports_rollback() {
    let t = TestApp::new().await;
    let buyer = t.buyer(200).await;
    t.sandbox.gateway.set_fail_on_create(true);

    let (status, json) = t
        .post(
            "/orders/intent",
            Some(buyer),
            json!({ "delivery_slug": "home", "use_wallet": true }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["kind"], "integration");
    assert_eq!(json["rolled_back"], true);
    assert_eq!(json["wallet_restored"], 200);
    assert_eq!(json["wallet_applied"], 0);
    assert_eq!(json["amount_due"], 0);
}

#[tokio::test]
async fn test_order_is_buyer_scoped() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let data = t.checkout(buyer, false).await;
    let uri = format!("/orders/{}", data["order_id"].as_str().unwrap());

    let (status, json) = t.get(&uri, buyer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["payment_status"], "pending");

    let (status, _) = t.get(&uri, UserId::new()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.get("/orders/not-a-uuid", buyer).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_capture_and_bad_signature() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let data = t.checkout(buyer, false).await;
    let order_ref = data["gateway_order_ref"].as_str().unwrap();

    let payload = captured_event("pay_1", order_ref);
    let (status, _) = t.webhook(&payload, "deadbeef").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let signature = signature::sign(WEBHOOK_SECRET, payload.to_string().as_bytes());
    let (status, json) = t.webhook(&payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "applied");

    let (status, json) = t.webhook(&payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "duplicate");

    let uri = format!("/orders/{}", data["order_id"].as_str().unwrap());
    let (_, json) = t.get(&uri, buyer).await;
    assert_eq!(json["data"]["payment_status"], "paid");
}

#[tokio::test]
async fn test_verify_payment_with_proof() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let data = t.checkout(buyer, false).await;
    let order_ref = data["gateway_order_ref"].as_str().unwrap();

    let (status, json) = t
        .post(
            "/payments/verify",
            Some(buyer),
            json!({
                "intent_id": data["intent_id"],
                "gateway_order_ref": order_ref,
                "gateway_payment_ref": "pay_9",
                "signature": signature::sign_payment_proof(KEY_SECRET, order_ref, "pay_9"),
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["status"], "captured");
    assert_eq!(json["data"]["applied"], true);
}

#[tokio::test]
async fn test_mark_failed_then_cancel_conflicts() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let data = t.checkout(buyer, false).await;

    let (status, json) = t
        .post(
            "/payments/fail",
            Some(buyer),
            json!({ "intent_id": data["intent_id"], "reason": "closed the tab" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "failed");

    let uri = format!("/orders/{}/cancel", data["order_id"].as_str().unwrap());
    let (status, json) = t.post(&uri, Some(buyer), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "domain");
}

#[tokio::test]
async fn test_cancel_unpaid_order() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let data = t.checkout(buyer, false).await;

    let uri = format!("/orders/{}/cancel", data["order_id"].as_str().unwrap());
    let (status, json) = t
        .post(&uri, Some(buyer), json!({ "reason": "wrong size" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["fulfillment_status"], "cancelled");
    assert_eq!(json["data"]["payment_status"], "failed");
    assert_eq!(json["data"]["cancel_reason"], "wrong size");
}

#[tokio::test]
async fn test_fulfillment_rejects_unknown_status() {
    let t = TestApp::new().await;
    let buyer = t.buyer(5_000).await;
    let data = t.checkout(buyer, true).await;
    let uri = format!("/orders/{}/fulfillment", data["order_id"].as_str().unwrap());

    let (status, _) = t
        .post(&uri, Some(buyer), json!({ "status": "teleported" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = t
        .post(&uri, Some(buyer), json!({ "status": "processing", "note": "packed" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["fulfillment_status"], "processing");

    let (status, _) = t
        .post(&uri, Some(buyer), json!({ "status": "delivered" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_order_status_poll() {
    let t = TestApp::new().await;
    let buyer = t.buyer(0).await;
    let data = t.checkout(buyer, false).await;
    let uri = format!(
        "/payments/orders/{}/status",
        data["gateway_order_ref"].as_str().unwrap()
    );

    let (status, json) = t.get(&uri, buyer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["decision"], "WAIT");

    let (status, _) = t.get("/payments/orders/order_unknown/status", buyer).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
