//! Stand-in consumer for the commission outbox.

use async_trait::async_trait;
use saga::{CommissionEvent, CommissionHandler};

/// Logs each commission event. The commission engine itself lives elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCommissionHandler;

#[async_trait]
impl CommissionHandler for LogCommissionHandler {
    async fn handle(&self, event: CommissionEvent) {
        metrics::counter!("commission_events_handled_total", "type" => event.event_type())
            .increment(1);
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(
                order_id = %event.order_id(),
                event_type = event.event_type(),
                %payload,
                "Commission event"
            ),
            Err(e) => tracing::warn!(order_id = %event.order_id(), error = %e, "Unserializable commission event"),
        }
    }
}
