pub mod checkout;
pub mod orders;
pub mod payment_webhooks;

use crate::{
    cache::DedupeCache,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    payments::PaymentGateway,
    services::commerce::{CheckoutService, PromotionEngine, ReconciliationService},
    services::orders::OrderService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db_pool, Some(event_sender.clone())));

        let checkout = Arc::new(CheckoutService::new(
            PromotionEngine::new(config.promotion.clone()),
            orders.clone(),
            gateway,
            event_sender.clone(),
            config.currency.clone(),
            config.payment.success_url.clone(),
            config.payment.cancel_url.clone(),
        ));

        let reconciliation = Arc::new(ReconciliationService::new(
            orders.clone(),
            event_sender,
            Arc::new(DedupeCache::default()),
        ));

        Self {
            orders,
            checkout,
            reconciliation,
        }
    }
}
