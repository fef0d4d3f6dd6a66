use crate::entities::order::OrderStatus;
use crate::metrics::MetricsRegistry;
use crate::notifications::Notifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events published by checkout and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        order_id: Uuid,
    },
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    /// Emitted exactly once per order, on the first transition to paid.
    OrderPaid {
        order_id: Uuid,
        shipping_country: Option<String>,
    },
    OrderPaymentFailed(Uuid),
    OrderCanceled(Uuid),
    OrderShipped {
        order_id: Uuid,
        tracking_number: Option<String>,
    },
    OrderDelivered(Uuid),
}

/// Event processing loop: fans domain events out to the notifier and the
/// metrics sink. Both are fire-and-forget collaborators: their failures
/// are logged and never fed back into the order flow that emitted the event.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsRegistry>,
) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPaid {
                order_id,
                shipping_country,
            } => {
                metrics.record_order_paid(shipping_country.as_deref());
                if let Err(e) = notifier.notify_order_paid(order_id).await {
                    error!(order_id = %order_id, error = %e, "order paid notification failed");
                }
            }
            Event::OrderPaymentFailed(order_id) => {
                metrics.record_payment_failed();
                warn!(order_id = %order_id, "payment failed for order");
            }
            Event::OrderCanceled(order_id) => {
                info!(order_id = %order_id, "order canceled by shopper");
            }
            Event::OrderShipped {
                order_id,
                tracking_number,
            } => {
                if let Err(e) = notifier
                    .notify_order_shipped(order_id, tracking_number.as_deref())
                    .await
                {
                    error!(order_id = %order_id, error = %e, "order shipped notification failed");
                }
            }
            Event::CheckoutStarted { order_id } => {
                info!(order_id = %order_id, "checkout started");
            }
            Event::OrderCreated(order_id) => {
                metrics.record_order_created();
                info!(order_id = %order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "order status changed"
                );
            }
            Event::OrderDelivered(order_id) => {
                info!(order_id = %order_id, "order delivered");
            }
        }
    }

    warn!("event processing loop has ended");
}
