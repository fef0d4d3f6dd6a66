use crate::{
    errors::ServiceError,
    services::orders::{
        item_to_response, model_to_response, OrderDetailResponse, OrderListResponse,
    },
    ApiResponse, AppState, ListQuery,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/ship", post(ship_order))
        .route("/:id/deliver", post(deliver_order))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ShipOrderRequest {
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub carrier: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = OrderDetailResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
    let items = state.services.orders.get_items(id).await?;

    Ok(Json(ApiResponse::success(OrderDetailResponse {
        order: model_to_response(order),
        items: items.into_iter().map(item_to_response).collect(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Paginated orders", body = OrderListResponse)),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let list = state
        .services
        .orders
        .list(query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

/// Fulfillment: mark a paid order as shipped.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/ship",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ShipOrderRequest,
    responses(
        (status = 200, description = "Order shipped"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order is not in a shippable state", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn ship_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShipOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let order = state
        .services
        .orders
        .mark_shipped(id, payload.tracking_number, payload.carrier)
        .await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Fulfillment: mark a shipped order as delivered.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order delivered"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order has not shipped", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn deliver_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.mark_delivered(id).await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}
