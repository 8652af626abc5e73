//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{FulfillmentStatus, Order};
use ledger::LedgerStore;
use saga::IntentReceipt;
use serde::Deserialize;

use super::{AppState, Caller, Envelope, ok, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub delivery_slug: String,
    #[serde(default)]
    pub use_wallet: bool,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FulfillmentRequest {
    pub status: String,
    pub note: Option<String>,
}

// -- Handlers --

/// POST /orders/intent: reserve the cart and open a payment intent.
///
/// Answers 201 for a new intent and 200 when the idempotency key replayed one.
#[tracing::instrument(skip(state, req))]
pub async fn create_intent<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(buyer): Caller,
    Json(req): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<Envelope<IntentReceipt>>), ApiError> {
    if req.delivery_slug.trim().is_empty() {
        return Err(ApiError::BadRequest("delivery_slug is required".into()));
    }
    let key = req
        .idempotency_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    let receipt = state
        .pipeline
        .intents
        .create_intent(buyer, req.delivery_slug.trim(), req.use_wallet, key)
        .await?;

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, ok(receipt)))
}

/// GET /orders/{id}: the caller's order.
#[tracing::instrument(skip(state))]
pub async fn get<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(buyer): Caller,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.pipeline.orders.order(buyer, order_id).await?;
    Ok(ok(order))
}

/// POST /orders/{id}/cancel: cancel an order that has not shipped.
///
/// The body, `{"reason": ...}`, is optional.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(buyer): Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let req: CancelOrderRequest = if body.is_empty() {
        CancelOrderRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Cancelled by buyer".to_string());

    let order = state
        .pipeline
        .orders
        .cancel_order(buyer, order_id, &reason)
        .await?;
    Ok(ok(order))
}

/// POST /orders/{id}/fulfillment: move fulfillment one step forward.
#[tracing::instrument(skip(state, req))]
pub async fn fulfillment<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(_operator): Caller,
    Path(id): Path<String>,
    Json(req): Json<FulfillmentRequest>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let status: FulfillmentStatus = req
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let order = state
        .pipeline
        .orders
        .advance_fulfillment(order_id, status, req.note.as_deref())
        .await?;
    Ok(ok(order))
}
