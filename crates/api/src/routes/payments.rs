//! Payment settlement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::IntentId;
use domain::IntentStatus;
use ledger::LedgerStore;
use saga::{PaymentVerification, StatusCheck, WebhookAck};
use serde::{Deserialize, Serialize};

use super::{AppState, Caller, Envelope, ok, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub intent_id: String,
    pub gateway_order_ref: String,
    pub gateway_payment_ref: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkFailedRequest {
    pub intent_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkFailedResponse {
    pub intent_id: IntentId,
    pub status: IntentStatus,
}

/// POST /payments/verify: settle a payment with the client's signed proof.
#[tracing::instrument(skip(state, req))]
pub async fn verify<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(user): Caller,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<Envelope<PaymentVerification>>, ApiError> {
    let intent_id: IntentId = parse_id(&req.intent_id, "intent id")?;
    let verification = state
        .pipeline
        .settlement
        .verify_payment(
            user,
            intent_id,
            &req.gateway_order_ref,
            &req.gateway_payment_ref,
            &req.signature,
        )
        .await?;
    Ok(ok(verification))
}

/// POST /payments/fail: the buyer gave up on paying.
#[tracing::instrument(skip(state, req))]
pub async fn mark_failed<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(user): Caller,
    Json(req): Json<MarkFailedRequest>,
) -> Result<Json<Envelope<MarkFailedResponse>>, ApiError> {
    let intent_id: IntentId = parse_id(&req.intent_id, "intent id")?;
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Payment cancelled by user".to_string());

    let status = state
        .pipeline
        .settlement
        .mark_payment_failed(user, intent_id, &reason)
        .await?;
    Ok(ok(MarkFailedResponse { intent_id, status }))
}

/// POST /payments/webhook: gateway event delivery.
///
/// The body is taken raw so the signature is checked over the exact bytes sent.
#[tracing::instrument(skip_all)]
pub async fn webhook<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope<WebhookAck>>, ApiError> {
    let signature = headers
        .get(state.signature_header.as_str())
        .and_then(|v| v.to_str().ok());
    let ack = state
        .pipeline
        .settlement
        .handle_webhook(&body, signature)
        .await?;
    Ok(ok(ack))
}

/// GET /payments/orders/{gateway_order_ref}/status: poll the gateway and act on the answer.
#[tracing::instrument(skip(state))]
pub async fn order_status<L: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Caller(user): Caller,
    Path(gateway_order_ref): Path<String>,
) -> Result<Json<Envelope<StatusCheck>>, ApiError> {
    let check = state
        .pipeline
        .settlement
        .verify_order_status(user, &gateway_order_ref)
        .await?;
    Ok(ok(check))
}
