//! Inbound provider webhook payloads.
//!
//! The provider delivers at-least-once and out of order. A single checkout
//! can surface shipping data in up to three places (session metadata, the
//! session's customer-details block, the payment intent's shipping block),
//! and the shapes are not mutually exclusive, so extraction reads all
//! three and folds them field by field.

use crate::entities::order::{OrderStatus, ShippingAddress, ShippingInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const ORDER_ID_METADATA_KEY: &str = "order_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    #[serde(rename = "checkout.session.completed")]
    SessionCompleted,
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.canceled")]
    PaymentCanceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Provider-assigned delivery id; repeats on redelivery.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ProviderEventKind,
    #[serde(default)]
    pub data: ProviderEventData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEventData {
    #[serde(default)]
    pub session: Option<CheckoutSessionPayload>,
    #[serde(default)]
    pub payment_intent: Option<PaymentIntentPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutSessionPayload {
    #[serde(default)]
    pub id: Option<String>,
    /// "paid" once the session's payment settled, "unpaid" before that.
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetailsPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerDetailsPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<AddressPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentIntentPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub shipping: Option<IntentShippingPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentShippingPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<AddressPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressPayload {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl From<&AddressPayload> for ShippingAddress {
    fn from(payload: &AddressPayload) -> Self {
        ShippingAddress {
            line1: payload.line1.clone(),
            line2: payload.line2.clone(),
            city: payload.city.clone(),
            state: payload.state.clone(),
            postal_code: payload.postal_code.clone(),
            country: payload.country.clone(),
        }
    }
}

impl ProviderEvent {
    /// The order this event belongs to, from session or intent metadata.
    pub fn order_id(&self) -> Option<Uuid> {
        let from_session = self
            .data
            .session
            .as_ref()
            .and_then(|s| s.metadata.as_ref())
            .and_then(|m| m.get(ORDER_ID_METADATA_KEY));
        let from_intent = self
            .data
            .payment_intent
            .as_ref()
            .and_then(|p| p.metadata.as_ref())
            .and_then(|m| m.get(ORDER_ID_METADATA_KEY));

        from_session
            .or(from_intent)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// The order status this event reports, taken alone. `None` for event
    /// kinds we do not consume.
    pub fn reported_status(&self) -> Option<OrderStatus> {
        match self.kind {
            ProviderEventKind::SessionCompleted => {
                let paid = self
                    .data
                    .session
                    .as_ref()
                    .and_then(|s| s.payment_status.as_deref())
                    == Some("paid");
                Some(if paid { OrderStatus::Paid } else { OrderStatus::Pending })
            }
            ProviderEventKind::PaymentSucceeded => Some(OrderStatus::Paid),
            ProviderEventKind::PaymentFailed => Some(OrderStatus::Failed),
            ProviderEventKind::PaymentCanceled => Some(OrderStatus::Canceled),
            ProviderEventKind::Unknown => None,
        }
    }

    /// Preferred external payment reference: intent id, falling back to the
    /// session id.
    pub fn payment_reference(&self) -> Option<&str> {
        self.data
            .payment_intent
            .as_ref()
            .and_then(|p| p.id.as_deref())
            .or_else(|| self.data.session.as_ref().and_then(|s| s.id.as_deref()))
    }

    /// Fold the shipping data of all payload shapes present on this event.
    /// Metadata wins over customer details, which win over intent shipping;
    /// per-field, so the sources complement each other.
    pub fn extract_shipping(&self) -> ShippingInfo {
        ShippingInfo::coalesce([
            self.shipping_from_metadata(),
            self.shipping_from_customer_details(),
            self.shipping_from_intent(),
        ])
    }

    fn shipping_from_metadata(&self) -> ShippingInfo {
        let Some(metadata) = self.data.session.as_ref().and_then(|s| s.metadata.as_ref()) else {
            return ShippingInfo::default();
        };
        let field = |key: &str| metadata.get(key).cloned();
        ShippingInfo {
            name: field("shipping_name"),
            phone: field("shipping_phone"),
            email: field("shipping_email"),
            address: ShippingAddress {
                line1: field("shipping_line1"),
                line2: field("shipping_line2"),
                city: field("shipping_city"),
                state: field("shipping_state"),
                postal_code: field("shipping_postal_code"),
                country: field("shipping_country"),
            },
        }
    }

    fn shipping_from_customer_details(&self) -> ShippingInfo {
        let Some(details) = self
            .data
            .session
            .as_ref()
            .and_then(|s| s.customer_details.as_ref())
        else {
            return ShippingInfo::default();
        };
        ShippingInfo {
            name: details.name.clone(),
            phone: details.phone.clone(),
            email: details.email.clone(),
            address: details.address.as_ref().map(Into::into).unwrap_or_default(),
        }
    }

    fn shipping_from_intent(&self) -> ShippingInfo {
        let Some(shipping) = self
            .data
            .payment_intent
            .as_ref()
            .and_then(|p| p.shipping.as_ref())
        else {
            return ShippingInfo::default();
        };
        ShippingInfo {
            name: shipping.name.clone(),
            phone: shipping.phone.clone(),
            email: None,
            address: shipping.address.as_ref().map(Into::into).unwrap_or_default(),
        }
    }
}
