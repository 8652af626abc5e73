//! Rollback of a reservation whose payment will never complete.

use common::IntentId;
use domain::settlement::{Channel, Settlement, Transition};
use ledger::{LedgerError, LedgerStore, SettlementOutcome};

use crate::config::SagaConfig;
use crate::retry;

/// Restores stock and wallet funds and closes the intent as failed or expired.
///
/// The work is one `apply_settlement` call, fenced by the order's
/// `stock_restored`/`wallet_refunded` flags and the intent status, so running
/// it again for the same intent changes nothing.
#[derive(Clone)]
pub struct Compensator<L> {
    ledger: L,
    attempts: u32,
    backoff: std::time::Duration,
}

impl<L: LedgerStore + Clone + 'static> Compensator<L> {
    pub fn new(ledger: L, config: &SagaConfig) -> Self {
        Self {
            ledger,
            attempts: config.compensation_attempts,
            backoff: config.compensation_backoff,
        }
    }

    /// Closes the intent as `failed`.
    pub async fn fail(
        &self,
        intent_id: IntentId,
        channel: Channel,
        reason: &str,
    ) -> Result<SettlementOutcome, LedgerError> {
        self.compensate(intent_id, Settlement::fail(channel, reason))
            .await
    }

    /// Closes the intent as `expired`.
    pub async fn expire(
        &self,
        intent_id: IntentId,
        channel: Channel,
        reason: &str,
    ) -> Result<SettlementOutcome, LedgerError> {
        self.compensate(intent_id, Settlement::expire(channel, reason))
            .await
    }

    /// Runs the compensating settlement with bounded, jittered retries.
    ///
    /// A final failure is logged and counted; the intent stays live and the
    /// sweeper picks it up once its hold window has passed.
    #[tracing::instrument(skip(self, settlement), fields(channel = settlement.channel.as_str()))]
    pub async fn compensate(
        &self,
        intent_id: IntentId,
        settlement: Settlement,
    ) -> Result<SettlementOutcome, LedgerError> {
        let result = retry::with_jitter(
            self.attempts,
            self.backoff,
            LedgerError::is_transient,
            |_| self.ledger.apply_settlement(intent_id, &settlement),
        )
        .await;

        match &result {
            Ok(outcome) => match &outcome.transition {
                Transition::Applied { to, compensation, .. } => {
                    metrics::counter!("compensations_total", "status" => to.as_str())
                        .increment(1);
                    tracing::info!(
                        %intent_id,
                        status = %to,
                        restocked_lines = compensation.restock.len(),
                        wallet_credit = %compensation.wallet_credit,
                        "Reservation compensated"
                    );
                }
                other => {
                    tracing::debug!(%intent_id, status = %other.status(), outcome = other.label(), "Compensation not needed");
                }
            },
            Err(e) => {
                metrics::counter!("compensation_failures_total").increment(1);
                tracing::error!(%intent_id, error = %e, "Compensation failed, leaving intent for the sweeper");
            }
        }

        result
    }
}
