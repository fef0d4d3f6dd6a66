use crate::{
    errors::ServiceError,
    services::commerce::checkout_service::{CheckoutRequest, CheckoutResponse},
    services::commerce::promotion::{CartLine, PromotionResult},
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_checkout))
        .route("/quote", post(quote_cart))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub lines: Vec<CartLine>,
}

/// Create a pending order from a cart and open a hosted payment session.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created, redirect the shopper", body = CheckoutResponse),
        (status = 400, description = "Empty cart or invalid input", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.checkout.checkout(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Price a cart for display without creating anything. Runs the same engine
/// as checkout, so the preview always matches what will be charged.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Priced cart", body = PromotionResult),
        (status = 400, description = "Empty cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn quote_cart(
    State(state): State<AppState>,
    Json(payload): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.services.checkout.quote(&payload.lines)?;
    Ok(Json(ApiResponse::success(result)))
}
