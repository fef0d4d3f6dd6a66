use crate::{
    db::DbPool,
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        OrderStatus, ShippingInfo,
    },
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Input for persisting a freshly priced order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub currency: String,
    pub subtotal_amount: i64,
    pub shipping_amount: i64,
    pub total_amount: i64,
    pub shipping_info: Option<ShippingInfo>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_amount: i64,
    pub is_free_gift: bool,
    pub snapshot: Option<serde_json::Value>,
}

/// What a reconciliation update actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub previous: OrderStatus,
    pub current: OrderStatus,
    /// True only for the mutation that moved the order into `paid`;
    /// gates the one-time side effects.
    pub first_transition_to_paid: bool,
    pub shipping_country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal_amount: i64,
    pub shipping_amount: i64,
    pub total_amount: i64,
    pub shipping_info: Option<ShippingInfo>,
    pub payment_reference: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub unit_amount: i64,
    pub total_amount: i64,
    pub is_free_gift: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Persistence layer for the order aggregate.
///
/// All status/shipping mutations go through a version-checked update so two
/// concurrent writers for the same order serialize; the loser re-reads.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Persist a pending order and its items in one transaction.
    #[instrument(skip(self, new_order), fields(order_id = %new_order.id))]
    pub async fn create_pending(&self, new_order: NewOrder) -> Result<OrderModel, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await?;

        let order = OrderActiveModel {
            id: Set(new_order.id),
            order_number: Set(new_order.order_number),
            status: Set(OrderStatus::Pending),
            currency: Set(new_order.currency),
            subtotal_amount: Set(new_order.subtotal_amount),
            shipping_amount: Set(new_order.shipping_amount),
            total_amount: Set(new_order.total_amount),
            shipping_info: Set(new_order.shipping_info),
            payment_reference: Set(None),
            tracking_number: Set(None),
            carrier: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        let order = order.insert(&txn).await?;

        for item in new_order.items {
            let total_amount = item.unit_amount * i64::from(item.quantity);
            let item = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                name: Set(item.name),
                image: Set(item.image),
                quantity: Set(item.quantity as i32),
                unit_amount: Set(item.unit_amount),
                total_amount: Set(total_amount),
                is_free_gift: Set(item.is_free_gift),
                snapshot: Set(item.snapshot),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(order_id = %order.id, order_number = %order.order_number, "pending order persisted");
        self.send_event(Event::OrderCreated(order.id)).await;

        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        let db = &*self.db_pool;
        Ok(OrderEntity::find_by_id(order_id).one(db).await?)
    }

    pub async fn get_items(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        let db = &*self.db_pool;
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?)
    }

    /// Paginated order listing, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u64, per_page: u64) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Apply a provider-reported status plus extracted shipping data.
    ///
    /// Read-modify-write under an optimistic version check: a concurrent
    /// update makes the conditional write miss, in which case the state is
    /// re-read and re-applied once before surfacing the conflict. The
    /// returned outcome reflects what this call actually changed, so a
    /// duplicate delivery that lost the race never claims the paid edge.
    #[instrument(skip(self, extracted), fields(order_id = %order_id, reported = %reported))]
    pub async fn transition_with_shipping(
        &self,
        order_id: Uuid,
        reported: OrderStatus,
        extracted: &ShippingInfo,
        payment_reference: Option<&str>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let db = &*self.db_pool;

        for attempt in 0..2 {
            let order = OrderEntity::find_by_id(order_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

            let previous = order.status;
            let next = previous.resolve(reported);

            let merged = order
                .shipping_info
                .clone()
                .unwrap_or_default()
                .merged_with(extracted);
            let shipping_country = merged.address.country.clone();
            let merged = if merged.is_empty() { None } else { Some(merged) };

            // Payment reference is set once and kept, same as shipping fields.
            let payment_reference = match order.payment_reference.as_deref() {
                Some(existing) if !existing.trim().is_empty() => Some(existing.to_string()),
                _ => payment_reference
                    .filter(|r| !r.trim().is_empty())
                    .map(str::to_string),
            };

            let result = OrderEntity::update_many()
                .col_expr(order::Column::Status, Expr::value(next))
                .col_expr(order::Column::ShippingInfo, Expr::value(merged))
                .col_expr(order::Column::PaymentReference, Expr::value(payment_reference))
                .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
                .col_expr(order::Column::Version, Expr::value(order.version + 1))
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Version.eq(order.version))
                .exec(db)
                .await?;

            if result.rows_affected == 1 {
                let outcome = TransitionOutcome {
                    previous,
                    current: next,
                    first_transition_to_paid: !previous.is_paid_or_later()
                        && next == OrderStatus::Paid,
                    shipping_country,
                };
                if previous != next {
                    info!(
                        order_id = %order_id,
                        previous = %previous,
                        current = %next,
                        "order status transitioned"
                    );
                    self.send_event(Event::OrderStatusChanged {
                        order_id,
                        old_status: previous,
                        new_status: next,
                    })
                    .await;
                }
                return Ok(outcome);
            }

            warn!(
                order_id = %order_id,
                attempt,
                "order changed concurrently during reconciliation, re-reading"
            );
        }

        Err(ServiceError::ConcurrentModification(order_id))
    }

    /// Record the hosted-session id right after session creation. Never
    /// overwrites a reference that is already present.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn set_payment_reference(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentReference,
                Expr::value(Some(reference.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentReference.is_null())
            .exec(db)
            .await?;
        Ok(())
    }

    /// Fulfillment: mark a paid order shipped. Strict, unlike webhook
    /// reconciliation: an illegal transition is an error for the operator.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_shipped(
        &self,
        order_id: Uuid,
        tracking_number: Option<String>,
        carrier: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self
            .fulfillment_transition(order_id, OrderStatus::Shipped, tracking_number.clone(), carrier)
            .await?;
        self.send_event(Event::OrderShipped {
            order_id,
            tracking_number,
        })
        .await;
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        let order = self
            .fulfillment_transition(order_id, OrderStatus::Delivered, None, None)
            .await?;
        self.send_event(Event::OrderDelivered(order_id)).await;
        Ok(order)
    }

    async fn fulfillment_transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        tracking_number: Option<String>,
        carrier: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if !order.status.can_transition_to(to) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot move order from '{}' to '{}'",
                order.status, to
            )));
        }

        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(order::Column::Version, Expr::value(order.version + 1));
        if tracking_number.is_some() {
            update = update.col_expr(order::Column::TrackingNumber, Expr::value(tracking_number));
        }
        if carrier.is_some() {
            update = update.col_expr(order::Column::Carrier, Expr::value(carrier));
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(db)
            .await?;

        if result.rows_affected != 1 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!(order_id = %order_id, status = %to, "order fulfillment status updated");

        Ok(OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?)
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to publish order event");
            }
        }
    }
}

pub fn model_to_response(model: OrderModel) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        status: model.status,
        currency: model.currency,
        subtotal_amount: model.subtotal_amount,
        shipping_amount: model.shipping_amount,
        total_amount: model.total_amount,
        shipping_info: model.shipping_info,
        payment_reference: model.payment_reference,
        tracking_number: model.tracking_number,
        carrier: model.carrier,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

pub fn item_to_response(model: OrderItemModel) -> OrderItemResponse {
    OrderItemResponse {
        id: model.id,
        product_id: model.product_id,
        name: model.name,
        image: model.image,
        quantity: model.quantity,
        unit_amount: model.unit_amount,
        total_amount: model.total_amount,
        is_free_gift: model.is_free_gift,
    }
}
