//! Order and payment settlement saga.
//!
//! Placing an order touches three things that fail independently: the
//! ledger, the payment gateway and the background sweeper. Instead of a
//! distributed transaction, the saga commits a local reservation first,
//! talks to the gateway outside any transaction, and undoes the reservation
//! with a compensating settlement when payment cannot complete:
//!
//! 1. [`ReservationService`] takes stock and wallet funds and writes the order and its intent
//! 2. [`IntentManager`] opens the gateway order (or compensates if that fails)
//! 3. [`SettlementHandler`] applies whatever outcome is reported first
//! 4. [`Compensator`] restores stock and wallet funds on failure
//! 5. [`Sweeper`] resolves intents nobody reported on

pub mod collaborators;
pub mod compensator;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod intent_manager;
pub mod orders;
pub mod reservation;
pub mod retry;
pub mod settlement;
pub mod signature;
pub mod sweeper;

use std::sync::Arc;

pub use collaborators::{AddressBook, Cart, CartProvider, InMemoryAddressBook, InMemoryCarts};
pub use compensator::Compensator;
pub use config::{SagaConfig, Secret};
pub use error::{ErrorKind, Result, SagaError};
pub use events::{
    ChannelSink, CommissionEvent, CommissionHandler, CommissionSink, EventHandler, NullSink,
};
pub use gateway::{
    GatewayError, GatewayOrder, GatewayOrderStatus, GatewayPayment, GatewayPaymentStatus,
    PaymentGateway, SandboxGateway,
};
pub use intent_manager::{IntentManager, IntentReceipt};
pub use orders::OrderDesk;
pub use reservation::ReservationService;
pub use settlement::{
    PaymentVerification, PollDecision, SettlementHandler, StatusCheck, WebhookAck, WebhookStatus,
};
pub use sweeper::{SweepReport, Sweeper};

use ledger::LedgerStore;

/// Every saga service wired to one ledger, gateway and sink.
#[derive(Clone)]
pub struct Pipeline<L> {
    pub intents: IntentManager<L>,
    pub settlement: SettlementHandler<L>,
    pub compensator: Compensator<L>,
    pub sweeper: Sweeper<L>,
    pub orders: OrderDesk<L>,
}

impl<L: LedgerStore + Clone + 'static> Pipeline<L> {
    pub fn new(
        ledger: L,
        gateway: Arc<dyn PaymentGateway>,
        carts: Arc<dyn CartProvider>,
        addresses: Arc<dyn AddressBook>,
        sink: Arc<dyn CommissionSink>,
        config: SagaConfig,
    ) -> Self {
        let compensator = Compensator::new(ledger.clone(), &config);
        let reservations =
            ReservationService::new(ledger.clone(), carts, addresses, config.clone());
        let settlement = SettlementHandler::new(
            ledger.clone(),
            Arc::clone(&gateway),
            compensator.clone(),
            Arc::clone(&sink),
            config.clone(),
        );
        let intents = IntentManager::new(
            ledger.clone(),
            reservations,
            Arc::clone(&gateway),
            compensator.clone(),
            Arc::clone(&sink),
            config.clone(),
        );
        let sweeper = Sweeper::new(ledger.clone(), gateway, settlement.clone(), &config);
        let orders = OrderDesk::new(ledger, settlement.clone(), sink);

        Self {
            intents,
            settlement,
            compensator,
            sweeper,
            orders,
        }
    }
}
