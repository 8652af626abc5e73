//! The order record.

use chrono::{DateTime, Utc};
use common::{IntentId, OrderId, ProductId, SellerId, UserId};
use serde::{Deserialize, Serialize};

use super::{FulfillmentStatus, OrderError, PaymentStatus, RefundStatus};
use crate::money::Money;

/// Delivery address copied onto the order at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
}

/// A line item with prices frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub title: String,
    pub quantity: u32,
    /// List price per unit.
    pub unit_price: Money,
    /// Discounted price per unit; this is what the buyer pays.
    pub final_price: Money,
}

impl OrderItem {
    /// Returns the amount this line contributes to the subtotal.
    pub fn line_total(&self) -> Money {
        self.final_price.times(self.quantity)
    }
}

/// One entry of the append-only tracking log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub status: FulfillmentStatus,
    pub at: DateTime<Utc>,
    pub note: String,
}

/// Stock to give back for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Reservation effects that still have to be reversed.
///
/// Produced at most once per order: taking it flips the order's
/// `stock_restored` and `wallet_refunded` fences.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Compensation {
    pub restock: Vec<StockLine>,
    pub wallet_credit: Money,
}

impl Compensation {
    /// Returns true if nothing is left to reverse.
    pub fn is_empty(&self) -> bool {
        self.restock.is_empty() && self.wallet_credit.is_zero()
    }
}

/// Input for placing an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: UserId,
    pub items: Vec<OrderItem>,
    pub address: AddressSnapshot,
    pub tax_total: Money,
    pub wallet_applied: Money,
}

/// A buyer's committed purchase attempt.
///
/// Orders are never deleted. Payment status is changed only by
/// [`crate::settlement::apply`]; the methods here cover placement,
/// fulfillment and cancellation of paid orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub items: Vec<OrderItem>,
    pub address: AddressSnapshot,
    pub subtotal: Money,
    pub tax_total: Money,
    pub wallet_applied: Money,
    /// Residual owed to the gateway.
    pub amount_due: Money,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub refund_status: RefundStatus,
    pub gateway_payment_ref: Option<String>,
    pub cancel_reason: Option<String>,
    pub stock_restored: bool,
    pub wallet_refunded: bool,
    pub tracking: Vec<TrackingUpdate>,
    /// Weak back-reference to the intent settling this order.
    pub intent_id: Option<IntentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Places a new order.
    ///
    /// The order starts `pending` when a residual is owed and `paid` when
    /// the wallet covers the whole amount.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(item) = new.items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            });
        }

        let subtotal: Money = new.items.iter().map(OrderItem::line_total).sum();
        let gross = subtotal + new.tax_total;
        if new.wallet_applied.is_negative() || new.wallet_applied > gross {
            return Err(OrderError::InvalidWalletAmount {
                applied: new.wallet_applied,
                gross,
            });
        }

        let amount_due = gross - new.wallet_applied;
        let payment_status = if amount_due.is_zero() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        };

        let mut order = Self {
            id: OrderId::new(),
            buyer_id: new.buyer_id,
            items: new.items,
            address: new.address,
            subtotal,
            tax_total: new.tax_total,
            wallet_applied: new.wallet_applied,
            amount_due,
            payment_status,
            fulfillment_status: FulfillmentStatus::Placed,
            refund_status: RefundStatus::NotApplicable,
            gateway_payment_ref: None,
            cancel_reason: None,
            stock_restored: false,
            wallet_refunded: false,
            tracking: Vec::new(),
            intent_id: None,
            created_at: now,
            updated_at: now,
        };
        order.push_tracking("Order placed", now);
        Ok(order)
    }

    /// Returns subtotal plus tax.
    pub fn gross_total(&self) -> Money {
        self.subtotal + self.tax_total
    }

    /// Total number of units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Appends a tracking entry at the current fulfillment status.
    pub fn push_tracking(&mut self, note: impl Into<String>, now: DateTime<Utc>) {
        self.tracking.push(TrackingUpdate {
            status: self.fulfillment_status,
            at: now,
            note: note.into(),
        });
        self.updated_at = now;
    }

    /// Takes whatever reservation effects have not been reversed yet and
    /// flips the fences so a second call returns an empty compensation.
    pub fn take_compensation(&mut self) -> Compensation {
        let mut compensation = Compensation::default();

        if !self.stock_restored {
            compensation.restock = self
                .items
                .iter()
                .map(|item| StockLine {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                })
                .collect();
            self.stock_restored = true;
        }

        if !self.wallet_refunded && self.wallet_applied.is_positive() {
            compensation.wallet_credit = self.wallet_applied;
            self.wallet_refunded = true;
        }

        compensation
    }

    /// Cancels a paid order that has not shipped yet.
    ///
    /// Payment status stays `paid`; the gateway-paid part becomes a pending
    /// refund and the returned compensation covers stock and wallet.
    pub fn cancel_paid(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Compensation, OrderError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid {
                status: self.payment_status,
            });
        }
        if !self.fulfillment_status.can_cancel() {
            return Err(OrderError::NotCancellable {
                status: self.fulfillment_status,
            });
        }

        self.fulfillment_status = FulfillmentStatus::Cancelled;
        self.cancel_reason = Some(reason.to_string());
        if self.amount_due.is_positive() {
            self.refund_status = RefundStatus::Pending;
        }
        self.push_tracking(format!("Cancelled: {reason}"), now);

        Ok(self.take_compensation())
    }

    /// Moves fulfillment one step forward.
    pub fn advance(
        &mut self,
        next: FulfillmentStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid {
                status: self.payment_status,
            });
        }
        if !self.fulfillment_status.can_advance_to(next) {
            return Err(OrderError::InvalidFulfillmentTransition {
                from: self.fulfillment_status,
                to: next,
            });
        }

        self.fulfillment_status = next;
        if next == FulfillmentStatus::Returned && self.amount_due.is_positive() {
            self.refund_status = RefundStatus::Pending;
        }
        let note = note.map_or_else(|| format!("Order {next}"), str::to_string);
        self.push_tracking(note, now);
        Ok(())
    }
}
