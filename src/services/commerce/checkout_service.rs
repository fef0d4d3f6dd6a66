use crate::{
    entities::order::ShippingInfo,
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{CreateSessionRequest, PaymentGateway, SessionLineItem},
    services::commerce::promotion::{CartLine, PromotionEngine, PromotionResult},
    services::orders::{NewOrder, NewOrderItem, OrderService},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    /// Address snapshot collected by the storefront before hand-off, if any.
    /// The rest accumulates from provider webhooks after payment.
    #[serde(default)]
    pub shipping: Option<ShippingInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub session_id: String,
    pub redirect_url: String,
    pub currency: String,
    pub subtotal_amount: i64,
    pub shipping_amount: i64,
    pub total_amount: i64,
    pub promotion_name: String,
    pub free_items_applied: u32,
}

/// Converts a cart into a persisted pending order plus a hosted payment
/// session. The order is committed before the provider is called, so a
/// webhook referencing it always finds it, even for abandoned checkouts.
#[derive(Clone)]
pub struct CheckoutService {
    engine: PromotionEngine,
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    currency: String,
    success_url: String,
    cancel_url: String,
}

impl CheckoutService {
    pub fn new(
        engine: PromotionEngine,
        orders: Arc<OrderService>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        currency: String,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            engine,
            orders,
            gateway,
            event_sender,
            currency,
            success_url,
            cancel_url,
        }
    }

    /// Price a cart without persisting anything. The storefront preview and
    /// the checkout itself both run through the same engine, so the numbers
    /// shown before payment always equal the numbers charged.
    pub fn quote(&self, lines: &[CartLine]) -> Result<PromotionResult, ServiceError> {
        if total_quantity(lines) == 0 {
            return Err(ServiceError::EmptyCart);
        }
        Ok(self.engine.apply(lines))
    }

    #[instrument(skip(self, request), fields(line_count = request.lines.len()))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        if total_quantity(&request.lines) == 0 {
            return Err(ServiceError::EmptyCart);
        }

        let result = self.engine.apply(&request.lines);
        if result.free_items_applied > self.engine.max_free_items() {
            // The engine enforces the cap itself; seeing this means the
            // allocation logic regressed.
            error!(
                free_items_applied = result.free_items_applied,
                cap = self.engine.max_free_items(),
                "promotion cap exceeded in engine output"
            );
            return Err(ServiceError::InvariantViolation(
                "promotion free-item cap exceeded".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", order_id.to_string()[..8].to_uppercase());

        let subtotal_amount: i64 = request
            .lines
            .iter()
            .map(|l| l.unit_amount * i64::from(l.quantity))
            .sum();
        let total_amount = result.charged_lines_amount() + result.shipping_amount;

        let order = self
            .orders
            .create_pending(NewOrder {
                id: order_id,
                order_number: order_number.clone(),
                currency: self.currency.clone(),
                subtotal_amount,
                shipping_amount: result.shipping_amount,
                total_amount,
                shipping_info: request.shipping.clone(),
                items: order_items_from(&request.lines, &result),
            })
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::CheckoutStarted { order_id })
            .await
        {
            warn!(order_id = %order_id, error = %e, "failed to publish checkout started event");
        }

        // Gateway failure leaves the pending order in place; the shopper can
        // retry checkout and the next session reuses a fresh order.
        let session = self
            .gateway
            .create_session(CreateSessionRequest {
                order_id,
                currency: self.currency.clone(),
                line_items: session_line_items(&request.lines, &result),
                shipping_amount: result.shipping_amount,
                success_url: self.success_url.clone(),
                cancel_url: self.cancel_url.clone(),
                metadata: HashMap::from([(
                    crate::payments::events::ORDER_ID_METADATA_KEY.to_string(),
                    order_id.to_string(),
                )]),
            })
            .await?;

        if let Err(e) = self
            .orders
            .set_payment_reference(order_id, &session.session_id)
            .await
        {
            // The webhook will carry the reference again; do not fail the
            // checkout over bookkeeping.
            warn!(order_id = %order_id, error = %e, "failed to store payment reference");
        }

        info!(
            order_id = %order_id,
            order_number = %order_number,
            total_amount,
            promotion = %result.promotion_name,
            "checkout session created"
        );

        Ok(CheckoutResponse {
            order_id: order.id,
            order_number,
            session_id: session.session_id,
            redirect_url: session.redirect_url,
            currency: self.currency.clone(),
            subtotal_amount,
            shipping_amount: result.shipping_amount,
            total_amount,
            promotion_name: result.promotion_name,
            free_items_applied: result.free_items_applied,
        })
    }
}

fn total_quantity(lines: &[CartLine]) -> u32 {
    lines.iter().map(|l| l.quantity).sum()
}

/// Expand priced lines into order items: one at the charged unit amount for
/// the paid part, one at zero for the free part. The free item keeps the
/// original unit amount in its snapshot.
fn order_items_from(lines: &[CartLine], result: &PromotionResult) -> Vec<NewOrderItem> {
    let mut items = Vec::new();
    for priced in &result.lines {
        let line = &lines[priced.source_line];
        let snapshot = json!({
            "original_unit_amount": line.unit_amount,
            "display_name": line.display_name,
            "image": line.image,
        });

        if priced.pay_quantity > 0 {
            items.push(NewOrderItem {
                product_id: line.product_id.clone(),
                name: line.display_name.clone(),
                image: line.image.clone(),
                quantity: priced.pay_quantity,
                unit_amount: line.unit_amount,
                is_free_gift: false,
                snapshot: Some(snapshot.clone()),
            });
        }
        if priced.free_quantity > 0 {
            items.push(NewOrderItem {
                product_id: line.product_id.clone(),
                name: line.display_name.clone(),
                image: line.image.clone(),
                quantity: priced.free_quantity,
                unit_amount: 0,
                is_free_gift: true,
                snapshot: Some(snapshot),
            });
        }
    }
    items
}

fn session_line_items(lines: &[CartLine], result: &PromotionResult) -> Vec<SessionLineItem> {
    let mut items = Vec::new();
    for priced in &result.lines {
        let line = &lines[priced.source_line];
        if priced.pay_quantity > 0 {
            items.push(SessionLineItem {
                name: line.display_name.clone(),
                quantity: priced.pay_quantity,
                unit_amount: line.unit_amount,
                image: line.image.clone(),
            });
        }
        if priced.free_quantity > 0 {
            items.push(SessionLineItem {
                name: format!("{} (free gift)", line.display_name),
                quantity: priced.free_quantity,
                unit_amount: 0,
                image: line.image.clone(),
            });
        }
    }
    items
}
