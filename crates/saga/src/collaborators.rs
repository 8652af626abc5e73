//! Cart and address book, owned by other services.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ProductId, UserId};
use domain::{AddressSnapshot, Money};
use ledger::ReservationLine;

use crate::error::SagaError;

/// A buyer's active cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    pub lines: Vec<ReservationLine>,
    pub tax_total: Money,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.quantity == 0)
    }
}

/// Read and clear a buyer's cart.
#[async_trait]
pub trait CartProvider: Send + Sync {
    async fn active_cart(&self, buyer_id: UserId) -> Result<Cart, SagaError>;

    async fn clear_cart(&self, buyer_id: UserId) -> Result<(), SagaError>;
}

/// Resolves a delivery slug to an address.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn address(
        &self,
        buyer_id: UserId,
        slug: &str,
    ) -> Result<Option<AddressSnapshot>, SagaError>;
}

#[derive(Debug, Default)]
struct CartState {
    carts: HashMap<UserId, Cart>,
    fail_on_clear: bool,
}

/// In-memory carts for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarts {
    state: Arc<RwLock<CartState>>,
}

impl InMemoryCarts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line to the buyer's cart.
    pub fn add(&self, buyer_id: UserId, product_id: impl Into<ProductId>, quantity: u32) {
        self.state
            .write()
            .unwrap()
            .carts
            .entry(buyer_id)
            .or_default()
            .lines
            .push(ReservationLine {
                product_id: product_id.into(),
                quantity,
            });
    }

    pub fn set_tax(&self, buyer_id: UserId, tax_total: Money) {
        self.state
            .write()
            .unwrap()
            .carts
            .entry(buyer_id)
            .or_default()
            .tax_total = tax_total;
    }

    /// Makes `clear_cart` fail.
    pub fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().unwrap().fail_on_clear = fail;
    }

    pub fn line_count(&self, buyer_id: UserId) -> usize {
        self.state
            .read()
            .unwrap()
            .carts
            .get(&buyer_id)
            .map_or(0, |cart| cart.lines.len())
    }
}

#[async_trait]
impl CartProvider for InMemoryCarts {
    async fn active_cart(&self, buyer_id: UserId) -> Result<Cart, SagaError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .carts
            .get(&buyer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_cart(&self, buyer_id: UserId) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_clear {
            return Err(SagaError::Collaborator("cart service unavailable".into()));
        }
        state.carts.remove(&buyer_id);
        Ok(())
    }
}

/// In-memory address book for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<RwLock<HashMap<(UserId, String), AddressSnapshot>>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, buyer_id: UserId, slug: impl Into<String>, address: AddressSnapshot) {
        self.addresses
            .write()
            .unwrap()
            .insert((buyer_id, slug.into()), address);
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn address(
        &self,
        buyer_id: UserId,
        slug: &str,
    ) -> Result<Option<AddressSnapshot>, SagaError> {
        Ok(self
            .addresses
            .read()
            .unwrap()
            .get(&(buyer_id, slug.to_string()))
            .cloned())
    }
}
