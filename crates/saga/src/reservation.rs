//! Stock and wallet reservation for a buyer's cart.

use std::sync::Arc;

use common::UserId;
use ledger::{LedgerStore, NewReservation, Reservation, ReservationLine};

use crate::collaborators::{AddressBook, CartProvider};
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};

/// Turns the active cart into an order, a payment intent and a stock hold in
/// one ledger transaction.
#[derive(Clone)]
pub struct ReservationService<L> {
    ledger: L,
    carts: Arc<dyn CartProvider>,
    addresses: Arc<dyn AddressBook>,
    config: SagaConfig,
}

impl<L: LedgerStore + Clone + 'static> ReservationService<L> {
    pub fn new(
        ledger: L,
        carts: Arc<dyn CartProvider>,
        addresses: Arc<dyn AddressBook>,
        config: SagaConfig,
    ) -> Self {
        Self {
            ledger,
            carts,
            addresses,
            config,
        }
    }

    /// Reserves the buyer's cart.
    ///
    /// Nothing is written when any line is short on stock or inactive, or
    /// the wallet balance moved underneath us. The cart is cleared only after
    /// the reservation committed; a failure to clear it is logged, not returned.
    #[tracing::instrument(skip(self, idempotency_key))]
    pub async fn reserve(
        &self,
        buyer_id: UserId,
        delivery_slug: &str,
        use_wallet: bool,
        idempotency_key: Option<String>,
    ) -> Result<Reservation> {
        let cart = self.carts.active_cart(buyer_id).await?;
        let lines: Vec<ReservationLine> = cart
            .lines
            .into_iter()
            .filter(|line| line.quantity > 0)
            .collect();
        if lines.is_empty() {
            return Err(SagaError::EmptyCart);
        }

        let address = self
            .addresses
            .address(buyer_id, delivery_slug)
            .await?
            .ok_or_else(|| SagaError::AddressNotFound {
                slug: delivery_slug.to_string(),
            })?;

        let reservation = self
            .ledger
            .commit_reservation(NewReservation {
                buyer_id,
                lines,
                address,
                tax_total: cart.tax_total,
                use_wallet,
                currency: self.config.currency.clone(),
                hold_window: self.config.hold_window,
                idempotency_key,
            })
            .await?;

        metrics::counter!("reservations_total").increment(1);
        tracing::info!(
            order_id = %reservation.order.id,
            intent_id = %reservation.intent.id,
            amount_due = %reservation.order.amount_due,
            wallet_applied = %reservation.order.wallet_applied,
            "Reservation committed"
        );

        if let Err(e) = self.carts.clear_cart(buyer_id).await {
            tracing::warn!(%buyer_id, error = %e, "Failed to clear cart after reservation");
        }

        Ok(reservation)
    }
}
