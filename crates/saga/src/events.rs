//! Commission outbox.
//!
//! Settlement publishes facts after its transaction commits; the commission
//! engine consumes them on its own schedule. Publishing never blocks and
//! never fails the settlement that produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Money, Order, OrderItem};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Facts the commission engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionEvent {
    OrderPaid {
        order_id: OrderId,
        buyer_id: UserId,
        items: Vec<OrderItem>,
        amount_due: Money,
        wallet_applied: Money,
        at: DateTime<Utc>,
    },
    OrderDelivered {
        order_id: OrderId,
        buyer_id: UserId,
        items: Vec<OrderItem>,
        at: DateTime<Utc>,
    },
}

impl CommissionEvent {
    pub fn order_paid(order: &Order, at: DateTime<Utc>) -> Self {
        CommissionEvent::OrderPaid {
            order_id: order.id,
            buyer_id: order.buyer_id,
            items: order.items.clone(),
            amount_due: order.amount_due,
            wallet_applied: order.wallet_applied,
            at,
        }
    }

    pub fn order_delivered(order: &Order, at: DateTime<Utc>) -> Self {
        CommissionEvent::OrderDelivered {
            order_id: order.id,
            buyer_id: order.buyer_id,
            items: order.items.clone(),
            at,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            CommissionEvent::OrderPaid { order_id, .. }
            | CommissionEvent::OrderDelivered { order_id, .. } => *order_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CommissionEvent::OrderPaid { .. } => "order_paid",
            CommissionEvent::OrderDelivered { .. } => "order_delivered",
        }
    }
}

/// Fire-and-forget destination for commission events.
pub trait CommissionSink: Send + Sync {
    fn publish(&self, event: CommissionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CommissionSink for NullSink {
    fn publish(&self, _event: CommissionEvent) {}
}

/// Producer side of a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<CommissionEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its events arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CommissionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl CommissionSink for ChannelSink {
    fn publish(&self, event: CommissionEvent) {
        let event_type = event.event_type();
        let order_id = event.order_id();
        if let Err(e) = self.sender.try_send(event) {
            tracing::warn!(%order_id, event_type, error = %e, "Dropping commission event");
            metrics::counter!("commission_events_dropped_total").increment(1);
        } else {
            metrics::counter!("commission_events_published_total").increment(1);
        }
    }
}

/// Consumer of commission events.
#[async_trait]
pub trait CommissionHandler: Send + Sync {
    async fn handle(&self, event: CommissionEvent);
}

/// Drains a [`ChannelSink`] receiver, running the handler for each event on its own task.
pub struct EventHandler {
    receiver: mpsc::Receiver<CommissionEvent>,
    handler: Arc<dyn CommissionHandler>,
}

impl EventHandler {
    pub fn new(receiver: mpsc::Receiver<CommissionEvent>, handler: Arc<dyn CommissionHandler>) -> Self {
        Self { receiver, handler }
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                tracing::debug!(order_id = %event.order_id(), event_type = event.event_type(), "Handling commission event");
                handler.handle(event).await;
            });
        }
        tracing::info!("Commission event channel closed");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
