//! Identifier types shared by every crate in the settlement workspace.

mod types;

pub use types::{IntentId, OrderId, ProductId, SellerId, UserId, WalletTxId};
