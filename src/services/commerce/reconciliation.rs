use crate::{
    cache::DedupeCache,
    entities::order::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    payments::events::{ProviderEvent, ProviderEventKind},
    services::orders::OrderService,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of consuming one provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// True only when this call performed the first transition to paid.
    pub transitioned: bool,
}

impl ReconcileOutcome {
    fn unchanged() -> Self {
        Self { transitioned: false }
    }
}

/// Merges asynchronous, possibly-duplicated, possibly-out-of-order payment
/// provider events into authoritative order state.
///
/// Safe to call any number of times with logically-equivalent events: the
/// state machine ignores stale reports, the shipping merge is monotonic,
/// and the one-time side effects are gated on the transition the
/// version-checked update actually performed.
#[derive(Clone)]
pub struct ReconciliationService {
    orders: Arc<OrderService>,
    event_sender: Arc<EventSender>,
    dedupe: Arc<DedupeCache>,
}

impl ReconciliationService {
    pub fn new(
        orders: Arc<OrderService>,
        event_sender: Arc<EventSender>,
        dedupe: Arc<DedupeCache>,
    ) -> Self {
        Self {
            orders,
            event_sender,
            dedupe,
        }
    }

    #[instrument(skip(self, event), fields(event_id = event.id.as_deref().unwrap_or("-")))]
    pub async fn reconcile(&self, event: &ProviderEvent) -> Result<ReconcileOutcome, ServiceError> {
        if event.kind == ProviderEventKind::Unknown {
            debug!("ignoring provider event of unhandled kind");
            return Ok(ReconcileOutcome::unchanged());
        }

        if let Some(event_id) = event.id.as_deref() {
            if self.dedupe.seen(event_id) {
                info!(event_id, "provider event already processed, acknowledging");
                return Ok(ReconcileOutcome::unchanged());
            }
        }

        let Some(order_id) = event.order_id() else {
            warn!("provider event carries no order correlator, dropping");
            return Ok(ReconcileOutcome::unchanged());
        };

        let Some(reported) = event.reported_status() else {
            return Ok(ReconcileOutcome::unchanged());
        };
        let extracted = event.extract_shipping();
        let payment_reference = event.payment_reference();

        let outcome = match self
            .orders
            .transition_with_shipping(order_id, reported, &extracted, payment_reference)
            .await
        {
            Ok(outcome) => outcome,
            Err(ServiceError::NotFound(_)) => {
                // No internal retry: the provider's own redelivery is the
                // recovery path if the order shows up later.
                warn!(order_id = %order_id, "webhook references unknown order, dropping event");
                return Ok(ReconcileOutcome::unchanged());
            }
            Err(other) => return Err(other),
        };

        if outcome.first_transition_to_paid {
            info!(order_id = %order_id, "order paid, dispatching one-time side effects");
            if let Err(e) = self
                .event_sender
                .send(Event::OrderPaid {
                    order_id,
                    shipping_country: outcome.shipping_country.clone(),
                })
                .await
            {
                // Side effects are best effort and must never undo the
                // status mutation that already committed.
                warn!(order_id = %order_id, error = %e, "failed to publish order paid event");
            }
        } else if outcome.previous != outcome.current {
            let follow_up = match outcome.current {
                OrderStatus::Failed => Some(Event::OrderPaymentFailed(order_id)),
                OrderStatus::Canceled => Some(Event::OrderCanceled(order_id)),
                _ => None,
            };
            if let Some(follow_up) = follow_up {
                if let Err(e) = self.event_sender.send(follow_up).await {
                    warn!(order_id = %order_id, error = %e, "failed to publish order event");
                }
            }
        }

        if let Some(event_id) = event.id.as_deref() {
            self.dedupe.record(event_id);
        }

        Ok(ReconcileOutcome {
            transitioned: outcome.first_transition_to_paid,
        })
    }
}
