//! Wallet ledger entries.

use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, UserId, WalletTxId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Stored-value wallets a user holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// Shopping wallet used to pay for orders.
    #[default]
    Ecart,
    ShortVideo,
    Reward,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Ecart => "ecart",
            WalletKind::ShortVideo => "short_video",
            WalletKind::Reward => "reward",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTxType {
    Earn,
    Spend,
    Refund,
    Withdraw,
}

impl WalletTxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTxType::Earn => "earn",
            WalletTxType::Spend => "spend",
            WalletTxType::Refund => "refund",
            WalletTxType::Withdraw => "withdraw",
        }
    }
}

/// What caused a wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTxSource {
    Purchase,
    System,
    Manual,
    Admin,
}

impl WalletTxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTxSource::Purchase => "purchase",
            WalletTxSource::System => "system",
            WalletTxSource::Manual => "manual",
            WalletTxSource::Admin => "admin",
        }
    }
}

/// Status of a wallet entry. Only asynchronous payouts ever sit in `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalletTxStatus {
    Pending,
    #[default]
    Success,
    Failed,
}

impl WalletTxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTxStatus::Pending => "pending",
            WalletTxStatus::Success => "success",
            WalletTxStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    User,
    #[default]
    System,
    Admin,
}

impl TriggeredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggeredBy::User => "user",
            TriggeredBy::System => "system",
            TriggeredBy::Admin => "admin",
        }
    }
}

text_enum!(WalletKind, "wallet", [Ecart, ShortVideo, Reward]);
text_enum!(WalletTxType, "wallet transaction type", [Earn, Spend, Refund, Withdraw]);
text_enum!(WalletTxSource, "wallet transaction source", [Purchase, System, Manual, Admin]);
text_enum!(WalletTxStatus, "wallet transaction", [Pending, Success, Failed]);
text_enum!(TriggeredBy, "trigger", [User, System, Admin]);

/// Immutable record of one movement into or out of a wallet.
///
/// Written in the same atomic unit as the balance change it documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: WalletTxId,
    pub user_id: UserId,
    pub tx_type: WalletTxType,
    pub source: WalletTxSource,
    pub from_wallet: WalletKind,
    pub to_wallet: Option<WalletKind>,
    pub amount: Money,
    pub status: WalletTxStatus,
    pub triggered_by: TriggeredBy,
    pub note: String,
    pub intent_id: Option<IntentId>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Wallet balance applied to an order at reservation time.
    pub fn spend(
        user_id: UserId,
        amount: Money,
        order_id: OrderId,
        intent_id: IntentId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WalletTxId::new(),
            user_id,
            tx_type: WalletTxType::Spend,
            source: WalletTxSource::Purchase,
            from_wallet: WalletKind::Ecart,
            to_wallet: None,
            amount,
            status: WalletTxStatus::Success,
            triggered_by: TriggeredBy::User,
            note: format!("Applied to order {order_id}"),
            intent_id: Some(intent_id),
            order_id: Some(order_id),
            created_at: now,
        }
    }

    /// Wallet balance given back because the order was compensated or cancelled.
    pub fn refund(
        user_id: UserId,
        amount: Money,
        order_id: OrderId,
        intent_id: Option<IntentId>,
        note: impl Into<String>,
        triggered_by: TriggeredBy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WalletTxId::new(),
            user_id,
            tx_type: WalletTxType::Refund,
            source: WalletTxSource::Purchase,
            from_wallet: WalletKind::Ecart,
            to_wallet: Some(WalletKind::Ecart),
            amount,
            status: WalletTxStatus::Success,
            triggered_by,
            note: note.into(),
            intent_id,
            order_id: Some(order_id),
            created_at: now,
        }
    }
}
