use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the ledger and fulfillment engine after their
/// transactions commit. Consumers must not assume ordering across events
/// for different entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    SalesOrderCreated {
        order_id: Uuid,
        tenant_id: Uuid,
        item_count: usize,
    },
    PurchaseOrderCreated {
        order_id: Uuid,
        tenant_id: Uuid,
    },
    PurchaseOrderCompleted {
        order_id: Uuid,
        tenant_id: Uuid,
    },
    StockAdjusted {
        product_id: Uuid,
        tenant_id: Uuid,
        quantity_change: i32,
        new_quantity: i32,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Background task draining the event channel. Events are logged; wiring
/// them to an outbox or broker is a deployment concern, not the engine's.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::SalesOrderCreated {
                order_id,
                tenant_id,
                item_count,
            } => {
                info!(order_id = %order_id, tenant_id = %tenant_id, item_count, "sales order created");
            }
            Event::PurchaseOrderCreated {
                order_id,
                tenant_id,
            } => {
                info!(order_id = %order_id, tenant_id = %tenant_id, "purchase order created");
            }
            Event::PurchaseOrderCompleted {
                order_id,
                tenant_id,
            } => {
                info!(order_id = %order_id, tenant_id = %tenant_id, "purchase order completed");
            }
            Event::StockAdjusted {
                product_id,
                tenant_id,
                quantity_change,
                new_quantity,
                ..
            } => {
                info!(
                    product_id = %product_id,
                    tenant_id = %tenant_id,
                    quantity_change,
                    new_quantity,
                    "stock adjusted"
                );
            }
        }
    }
}
