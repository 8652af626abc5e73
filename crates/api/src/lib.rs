//! HTTP API for the order and payment settlement saga.
//!
//! Provides checkout, order and payment endpoints over [`saga::Pipeline`],
//! with structured logging (tracing) and Prometheus metrics.

pub mod commission;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ledger::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    ChannelSink, CommissionEvent, InMemoryAddressBook, InMemoryCarts, Pipeline, SandboxGateway,
};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Capacity of the commission outbox channel.
const COMMISSION_CHANNEL_CAPACITY: usize = 1024;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: LedgerStore + Clone + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders/intent", post(routes::orders::create_intent::<L>))
        .route("/orders/{id}", get(routes::orders::get::<L>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<L>))
        .route(
            "/orders/{id}/fulfillment",
            post(routes::orders::fulfillment::<L>),
        )
        .route("/payments/verify", post(routes::payments::verify::<L>))
        .route("/payments/fail", post(routes::payments::mark_failed::<L>))
        .route("/payments/webhook", post(routes::payments::webhook::<L>))
        .route(
            "/payments/orders/{gateway_order_ref}/status",
            get(routes::payments::order_status::<L>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-process stand-ins for the services this API does not own.
#[derive(Clone, Default)]
pub struct Sandbox {
    pub gateway: SandboxGateway,
    pub carts: InMemoryCarts,
    pub addresses: InMemoryAddressBook,
}

/// Application state plus the handles a host process needs.
pub struct DefaultState<L> {
    pub state: Arc<AppState<L>>,
    pub sandbox: Sandbox,
    /// Receiving end of the commission outbox.
    pub commission_events: mpsc::Receiver<CommissionEvent>,
}

/// Creates the application state over `ledger`, with sandbox collaborators.
pub fn create_default_state<L: LedgerStore + Clone + 'static>(
    ledger: L,
    config: &Config,
) -> DefaultState<L> {
    let sandbox = Sandbox::default();
    let (sink, commission_events) = ChannelSink::new(COMMISSION_CHANNEL_CAPACITY);

    let pipeline = Pipeline::new(
        ledger,
        Arc::new(sandbox.gateway.clone()),
        Arc::new(sandbox.carts.clone()),
        Arc::new(sandbox.addresses.clone()),
        Arc::new(sink),
        config.saga(),
    );

    DefaultState {
        state: Arc::new(AppState::new(pipeline, config.signature_header.clone())),
        sandbox,
        commission_events,
    }
}
