//! Ledger Store: the durable side of the settlement saga.
//!
//! Every operation on [`LedgerStore`] is one local atomic unit. Two
//! implementations are provided: [`InMemoryLedger`] for tests and local runs,
//! and [`PgLedger`] backed by PostgreSQL.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedger;
pub use postgres::PgLedger;
pub use store::{
    LedgerStore, NewReservation, Product, Reservation, ReservationLine, SettlementOutcome,
};
