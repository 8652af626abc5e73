use common::{IntentId, OrderId, ProductId};
use domain::{DomainError, IntentStatus, Money, OrderError, UnknownVariant};
use thiserror::Error;

/// Errors that can occur when interacting with the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The product does not exist or is not for sale.
    #[error("Product unavailable: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    /// Not enough stock left for the requested quantity.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The wallet no longer holds the amount being applied.
    #[error("Insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Money, available: Money },

    /// Another live or captured intent already holds this idempotency key.
    #[error("Idempotency key already in use: {key}")]
    DuplicateIdempotencyKey { key: String },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Payment intent not found: {0}")]
    IntentNotFound(IntentId),

    /// The intent is not in a state that allows the write.
    #[error("Payment intent {intent_id} is {status}; write refused")]
    Fenced {
        intent_id: IntentId,
        status: IntentStatus,
    },

    /// An order rule rejected the operation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The settlement state machine rejected the operation.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// A stored status did not decode.
    #[error("Corrupt row: {0}")]
    Decode(#[from] UnknownVariant),

    /// A stored number does not fit the domain type.
    #[error("Corrupt row: {column} = {value} is out of range")]
    OutOfRange { column: &'static str, value: i64 },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure injected by a test double.
    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

impl LedgerError {
    /// Returns true for business-rule rejections the caller can act on.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            LedgerError::ProductUnavailable { .. }
                | LedgerError::InsufficientStock { .. }
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::Order(_)
        )
    }

    /// Returns true when a referenced row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::OrderNotFound(_) | LedgerError::IntentNotFound(_)
        )
    }

    /// Returns true when retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Injected(_))
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
