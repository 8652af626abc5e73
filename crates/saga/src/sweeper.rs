//! Reconciliation sweeper.
//!
//! Resolves intents whose hold window passed without a definite outcome,
//! including reservations left behind by a process that died between the
//! ledger commit and the gateway call.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::settlement::{Channel, Settlement};
use domain::{IntentStatus, PaymentIntent};
use ledger::LedgerStore;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SagaConfig;
use crate::error::Result;
use crate::gateway::{GatewayPayment, GatewayPaymentStatus, PaymentGateway};
use crate::settlement::SettlementHandler;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub captured: usize,
    pub failed: usize,
    pub expired: usize,
    /// Left for the next sweep, e.g. an authorized payment not yet captured.
    pub pending: usize,
    pub errors: usize,
}

/// What the gateway's payment attempts say about a stale intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Capture { payment_ref: String },
    Fail,
    Wait,
}

/// Any capture wins; no attempts, or only failed or never-submitted ones, is a failure.
pub fn resolve(payments: &[GatewayPayment]) -> Resolution {
    if let Some(captured) = payments
        .iter()
        .find(|p| p.status == GatewayPaymentStatus::Captured)
    {
        return Resolution::Capture {
            payment_ref: captured.id.clone(),
        };
    }

    if payments.iter().all(|p| {
        matches!(
            p.status,
            GatewayPaymentStatus::Failed | GatewayPaymentStatus::Created
        )
    }) {
        Resolution::Fail
    } else {
        Resolution::Wait
    }
}

/// Periodic scan of stale intents.
#[derive(Clone)]
pub struct Sweeper<L> {
    ledger: L,
    gateway: Arc<dyn PaymentGateway>,
    settlement: SettlementHandler<L>,
    batch_size: usize,
    interval: std::time::Duration,
    /// How long an unresolved intent stays out of later batches.
    revisit_after: chrono::Duration,
}

impl<L: LedgerStore + Clone + 'static> Sweeper<L> {
    pub fn new(
        ledger: L,
        gateway: Arc<dyn PaymentGateway>,
        settlement: SettlementHandler<L>,
        config: &SagaConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            settlement,
            batch_size: config.sweep_batch_size,
            interval: config.sweep_interval,
            revisit_after: chrono::Duration::from_std(config.sweep_interval)
                .unwrap_or_else(|_| chrono::Duration::minutes(10)),
        }
    }

    /// Runs one sweep over intents that were stale at `now`.
    ///
    /// A failure on one intent is logged and counted; the sweep carries on.
    /// Intents left pending or in error are deferred for one interval so the
    /// next batch reaches the ones behind them.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();
        let stale = self.ledger.stale_intents(now, self.batch_size).await?;
        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };

        for intent in stale {
            match self.reconcile(&intent).await {
                Ok(Some(IntentStatus::Captured)) => report.captured += 1,
                Ok(Some(IntentStatus::Failed)) => report.failed += 1,
                Ok(Some(IntentStatus::Expired)) => report.expired += 1,
                Ok(_) => {
                    report.pending += 1;
                    self.defer(&intent, now).await;
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(intent_id = %intent.id, error = %e, "Failed to reconcile intent");
                    self.defer(&intent, now).await;
                }
            }
        }

        metrics::counter!("sweeps_total").increment(1);
        metrics::histogram!("sweep_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            scanned = report.scanned,
            captured = report.captured,
            failed = report.failed,
            expired = report.expired,
            pending = report.pending,
            errors = report.errors,
            "Sweep finished"
        );
        Ok(report)
    }

    async fn defer(&self, intent: &PaymentIntent, now: DateTime<Utc>) {
        let until = now + self.revisit_after;
        if let Err(e) = self.ledger.defer_sweep(intent.id, until).await {
            tracing::warn!(intent_id = %intent.id, error = %e, "Failed to defer intent sweep");
        }
    }

    /// Returns the intent's new status, or `None` when it was left alone.
    async fn reconcile(&self, intent: &PaymentIntent) -> Result<Option<IntentStatus>> {
        let Some(gateway_order_ref) = intent.gateway_order_ref.as_deref() else {
            let outcome = self
                .settlement
                .settle(
                    intent.id,
                    Settlement::expire(Channel::Sweeper, "no gateway order was opened before expiry"),
                )
                .await?;
            return Ok(Some(outcome.intent.status));
        };

        let payments = self.gateway.fetch_payments(gateway_order_ref).await?;
        let settlement = match resolve(&payments) {
            Resolution::Capture { payment_ref } => {
                Settlement::capture(Channel::Sweeper, Some(payment_ref))
            }
            Resolution::Fail => {
                Settlement::fail(Channel::Sweeper, "payment not completed before expiry")
            }
            Resolution::Wait => {
                tracing::debug!(intent_id = %intent.id, gateway_order_ref, "Payment still in flight");
                return Ok(None);
            }
        };

        let outcome = self.settlement.settle(intent.id, settlement).await?;
        Ok(Some(outcome.intent.status))
    }

    /// Sweeps every interval until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);
        tracing::info!(interval = ?self.interval, batch_size = self.batch_size, "Reconciliation sweeper started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.sweep_at(Utc::now()).await {
                        tracing::error!(error = %e, "Reconciliation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reconciliation sweeper stopped");
    }

    /// Starts [`Sweeper::run`] on its own task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
