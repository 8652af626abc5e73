//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use ledger::LedgerError;
use saga::{ErrorKind, SagaError};
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"success": false, "error": ..., "kind": ...}`,
/// plus the rollback figures when the gateway failed after a reservation.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or malformed caller identity.
    Unauthorized(String),
    /// Saga execution error.
    Saga(SagaError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Saga(err) => saga_status(err),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) | ApiError::Unauthorized(_) => ErrorKind::Integrity,
            ApiError::Saga(err) => err.kind(),
        }
    }
}

fn order_error_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotCancellable { .. }
        | OrderError::InvalidFulfillmentTransition { .. }
        | OrderError::NotPaid { .. } => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::EmptyCart | SagaError::AddressNotFound { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SagaError::IntentClosed { .. } | SagaError::IntentPending { .. } => StatusCode::CONFLICT,
        SagaError::Order(e) | SagaError::Ledger(LedgerError::Order(e)) => order_error_status(e),
        SagaError::InvalidSignature
        | SagaError::InvalidPayload(_)
        | SagaError::ReferenceMismatch => StatusCode::BAD_REQUEST,
        SagaError::NotOwner => StatusCode::FORBIDDEN,
        SagaError::IntentNotFound(_)
        | SagaError::OrderNotFound(_)
        | SagaError::UnknownGatewayOrder(_) => StatusCode::NOT_FOUND,
        SagaError::GatewayFailed { .. } | SagaError::Gateway(_) => StatusCode::BAD_GATEWAY,
        SagaError::Ledger(e) if e.is_not_found() => StatusCode::NOT_FOUND,
        SagaError::Ledger(e) if e.is_domain() => StatusCode::CONFLICT,
        SagaError::Ledger(LedgerError::DuplicateIdempotencyKey { .. })
        | SagaError::Ledger(LedgerError::Fenced { .. }) => StatusCode::CONFLICT,
        SagaError::Ledger(_) | SagaError::Collaborator(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let mut body = json!({
            "success": false,
            "kind": kind,
        });

        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) => msg,
            ApiError::Saga(SagaError::GatewayFailed {
                reason,
                order_id,
                intent_id,
                rolled_back,
                wallet_restored,
                wallet_applied,
                amount_due,
            }) => {
                body["rolled_back"] = Value::Bool(rolled_back);
                body["order_id"] = json!(order_id);
                body["intent_id"] = json!(intent_id);
                body["wallet_restored"] = json!(wallet_restored);
                body["wallet_applied"] = json!(wallet_applied);
                body["amount_due"] = json!(amount_due);
                format!("Payment gateway failed: {reason}")
            }
            ApiError::Saga(err) if kind == ErrorKind::Internal => {
                tracing::error!(error = %err, "internal server error");
                "Internal server error".to_string()
            }
            ApiError::Saga(err) => err.to_string(),
        };
        body["error"] = Value::String(message);

        (status, Json(body)).into_response()
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
