use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the services. Delivery is best-effort: a full or
/// closed channel never fails the operation that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    MovementRecorded {
        movement_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        movement_type: String,
        quantity: Decimal,
    },
    InventoryAdjusted {
        product_id: Uuid,
        warehouse_id: Uuid,
        old_quantity: Decimal,
        new_quantity: Decimal,
        delta: Decimal,
    },
    PurchaseOrderCreated(Uuid),
    PurchaseOrderMarkedOrdered(Uuid),
    PurchaseOrderReceived {
        order_id: Uuid,
        fully_received: bool,
    },
    SalesOrderCreated(Uuid),
    SalesOrderConfirmed(Uuid),
    SalesOrderFulfilled(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, returning an error string when the channel is closed.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }
}

/// Builds a connected sender/receiver pair.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Background task draining the event channel. Today events only feed the
/// log; downstream consumers subscribe here when they appear.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::MovementRecorded {
                product_id,
                warehouse_id,
                movement_type,
                quantity,
                ..
            } => info!(
                %product_id, %warehouse_id, movement_type, %quantity,
                "stock movement recorded"
            ),
            Event::InventoryAdjusted {
                product_id,
                warehouse_id,
                delta,
                new_quantity,
                ..
            } => info!(
                %product_id, %warehouse_id, %delta, %new_quantity,
                "inventory adjusted"
            ),
            other => info!(event = ?other, "domain event"),
        }
    }
}
