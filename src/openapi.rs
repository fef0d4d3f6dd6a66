use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::checkout::create_checkout,
        crate::handlers::checkout::quote_cart,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::ship_order,
        crate::handlers::orders::deliver_order,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::ShippingInfo,
        crate::entities::order::ShippingAddress,
        crate::services::commerce::promotion::CartLine,
        crate::services::commerce::promotion::PricedLine,
        crate::services::commerce::promotion::PromotionResult,
        crate::services::commerce::checkout_service::CheckoutRequest,
        crate::services::commerce::checkout_service::CheckoutResponse,
        crate::handlers::checkout::QuoteRequest,
        crate::handlers::orders::ShipOrderRequest,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::OrderDetailResponse,
        crate::services::orders::OrderListResponse,
    )),
    tags(
        (name = "Checkout", description = "Cart pricing and payment hand-off"),
        (name = "Orders", description = "Order lookup and fulfillment"),
        (name = "Payments", description = "Payment provider webhooks")
    ),
    info(
        title = "Storefront API",
        description = "Checkout, promotion pricing and payment reconciliation"
    )
)]
pub struct ApiDoc;

pub fn api_doc() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
