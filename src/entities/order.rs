use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order aggregate root. Monetary amounts are integer minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub currency: String,
    /// Pre-promotion value of the cart ("what it would have cost").
    pub subtotal_amount: i64,
    pub shipping_amount: i64,
    /// Amount actually charged: discounted lines plus shipping.
    pub total_amount: i64,
    #[sea_orm(column_type = "Json", nullable)]
    pub shipping_info: Option<ShippingInfo>,
    #[sea_orm(nullable)]
    pub payment_reference: Option<String>,
    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,
    #[sea_orm(nullable)]
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle status.
///
/// `pending → {paid, failed, canceled}`, `paid → shipped`, `shipped →
/// delivered`. `failed` and `canceled` are terminal, and nothing ever goes
/// back to `pending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

impl OrderStatus {
    /// True once payment has been captured (or the order moved further).
    pub fn is_paid_or_later(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Canceled | OrderStatus::Delivered)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Paid) | (Pending, Failed) | (Pending, Canceled) | (Paid, Shipped) | (Shipped, Delivered)
        )
    }

    /// Resolve a provider-reported status against the current one.
    ///
    /// Webhook events arrive duplicated and out of order, so an illegal
    /// report (e.g. "still pending" for an order that is already paid) keeps
    /// the current status instead of erroring.
    pub fn resolve(self, reported: OrderStatus) -> OrderStatus {
        if self.can_transition_to(reported) {
            reported
        } else {
            self
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        };
        f.write_str(s)
    }
}

/// Shipping contact snapshot accumulated from partial provider payloads.
///
/// Every field is independently optional: different payment methods surface
/// different subsets, so the full picture is assembled over several webhook
/// deliveries via [`ShippingInfo::merged_with`].
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct ShippingInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub address: ShippingAddress,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct ShippingAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Keep `current` when it already holds a non-blank value, otherwise take
/// the incoming one. Blank strings count as absent.
fn fill(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match current {
        Some(v) if !v.trim().is_empty() => Some(v.clone()),
        _ => match incoming {
            Some(v) if !v.trim().is_empty() => Some(v.clone()),
            _ => None,
        },
    }
}

impl ShippingInfo {
    /// Monotonic field-by-field merge: an already-filled field is never
    /// replaced, and an incoming blank never erases anything.
    pub fn merged_with(&self, incoming: &ShippingInfo) -> ShippingInfo {
        ShippingInfo {
            name: fill(&self.name, &incoming.name),
            phone: fill(&self.phone, &incoming.phone),
            email: fill(&self.email, &incoming.email),
            address: ShippingAddress {
                line1: fill(&self.address.line1, &incoming.address.line1),
                line2: fill(&self.address.line2, &incoming.address.line2),
                city: fill(&self.address.city, &incoming.address.city),
                state: fill(&self.address.state, &incoming.address.state),
                postal_code: fill(&self.address.postal_code, &incoming.address.postal_code),
                country: fill(&self.address.country, &incoming.address.country),
            },
        }
    }

    /// Fold several partial extracts into one, earlier sources winning.
    pub fn coalesce<I>(sources: I) -> ShippingInfo
    where
        I: IntoIterator<Item = ShippingInfo>,
    {
        sources
            .into_iter()
            .fold(ShippingInfo::default(), |acc, next| acc.merged_with(&next))
    }

    pub fn is_empty(&self) -> bool {
        *self == ShippingInfo::default()
    }
}
