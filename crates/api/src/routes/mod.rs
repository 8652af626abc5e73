//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use ledger::LedgerStore;
use saga::Pipeline;
use serde::Serialize;

use crate::error::ApiError;

/// Header carrying the authenticated caller, set by the gateway in front of us.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state accessible from all handlers.
pub struct AppState<L> {
    pub pipeline: Pipeline<L>,
    /// Header the gateway puts its webhook signature in.
    pub signature_header: String,
}

impl<L: LedgerStore + Clone + 'static> AppState<L> {
    pub fn new(pipeline: Pipeline<L>, signature_header: impl Into<String>) -> Self {
        Self {
            pipeline,
            signature_header: signature_header.into(),
        }
    }
}

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// The caller named by the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Caller)
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))
    }
}

/// Parses a path segment into an id, or a 400.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}: {raw}")))
}
