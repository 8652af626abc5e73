//! API server entry point.

use std::sync::Arc;

use ledger::{InMemoryLedger, LedgerStore, PgLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::EventHandler;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::commission::LogCommissionHandler;
use api::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Serves the API over `ledger` until a shutdown signal arrives.
async fn serve<L: LedgerStore + Clone + 'static>(
    ledger: L,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    let parts = api::create_default_state(ledger, &config);

    let commission = EventHandler::new(parts.commission_events, Arc::new(LogCommissionHandler)).spawn();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = parts.state.pipeline.sweeper.clone().spawn(shutdown_rx);

    let app = api::create_app(parts.state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "sweeper task panicked");
    }
    commission.abort();

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Load configuration
    let config = Config::from_env();
    tracing::info!(?config, "configuration loaded");
    if config.webhook_secret.is_empty() || config.key_secret.is_empty() {
        tracing::warn!("gateway secrets are not set; signed payment callbacks will be rejected");
    }

    // 4. Pick the ledger and serve
    match config.database_url.clone() {
        Some(url) => {
            let ledger = PgLedger::connect(url.reveal(), config.database_max_connections)
                .await
                .expect("failed to connect to database");
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL ledger");
            serve(ledger, config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger");
            serve(InMemoryLedger::new(), config, metrics_handle).await;
        }
    }
}
