//! Webhook reconciliation: idempotency, out-of-order delivery, monotonic
//! shipping merge, and exactly-once side effects.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, wait_until, TestApp};
use serde_json::json;
use storefront_api::payments::events::ProviderEvent;
use uuid::Uuid;

async fn create_pending_order(app: &TestApp) -> Uuid {
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "lines": [{
                    "product_id": "A",
                    "unit_amount": 1000,
                    "quantity": 3,
                    "display_name": "Classic Tee"
                }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["data"]["order_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

fn event(value: serde_json::Value) -> ProviderEvent {
    serde_json::from_value(value).expect("valid provider event")
}

fn payment_succeeded(order_id: Uuid, event_id: &str) -> ProviderEvent {
    event(json!({
        "id": event_id,
        "type": "payment.succeeded",
        "data": {
            "payment_intent": {
                "id": "pi_1",
                "metadata": { "order_id": order_id.to_string() },
                "shipping": {
                    "name": "Ana Silva",
                    "address": { "city": "Lisbon", "country": "PT" }
                }
            }
        }
    }))
}

async fn order_status(app: &TestApp, order_id: Uuid) -> String {
    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    let body = response_json(response).await;
    body["data"]["status"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn first_paid_transition_reports_and_fires_once() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;
    let reconciler = app.state.services.reconciliation.clone();

    let outcome = reconciler
        .reconcile(&payment_succeeded(order_id, "evt_1"))
        .await
        .unwrap();
    assert!(outcome.transitioned);

    // Logically-equivalent redelivery under a different delivery id.
    let outcome = reconciler
        .reconcile(&payment_succeeded(order_id, "evt_2"))
        .await
        .unwrap();
    assert!(!outcome.transitioned);

    assert_eq!(order_status(&app, order_id).await, "paid");

    wait_until(|| app.notifier.paid_count() == 1).await;
    assert_eq!(app.state.metrics.orders_paid_total(), 1);
    assert_eq!(app.state.metrics.shipping_country_total("PT"), 1);
    // Still exactly one notification after the duplicate.
    assert_eq!(app.notifier.paid_count(), 1);
}

#[tokio::test]
async fn replayed_delivery_id_short_circuits() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;
    let reconciler = app.state.services.reconciliation.clone();

    let delivery = payment_succeeded(order_id, "evt_dup");
    assert!(reconciler.reconcile(&delivery).await.unwrap().transitioned);
    assert!(!reconciler.reconcile(&delivery).await.unwrap().transitioned);

    wait_until(|| app.notifier.paid_count() == 1).await;
    assert_eq!(app.state.metrics.orders_paid_total(), 1);
}

#[tokio::test]
async fn stale_session_event_never_downgrades_paid() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;
    let reconciler = app.state.services.reconciliation.clone();

    reconciler
        .reconcile(&payment_succeeded(order_id, "evt_1"))
        .await
        .unwrap();

    // A session event that, taken alone, claims the order is still unpaid.
    let stale = event(json!({
        "id": "evt_stale",
        "type": "checkout.session.completed",
        "data": {
            "session": {
                "id": "cs_1",
                "payment_status": "unpaid",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    }));
    let outcome = reconciler.reconcile(&stale).await.unwrap();

    assert!(!outcome.transitioned);
    assert_eq!(order_status(&app, order_id).await, "paid");
}

#[tokio::test]
async fn shipping_accumulates_monotonically_across_events() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;
    let reconciler = app.state.services.reconciliation.clone();

    // First event: customer details carry name, email and city.
    let session_completed = event(json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "session": {
                "id": "cs_1",
                "payment_status": "paid",
                "metadata": { "order_id": order_id.to_string() },
                "customer_details": {
                    "name": "Ana Silva",
                    "email": "ana@example.com",
                    "address": { "city": "Lisbon" }
                }
            }
        }
    }));
    assert!(reconciler.reconcile(&session_completed).await.unwrap().transitioned);

    // Second event: blank city must not erase Lisbon; new phone must land.
    let intent_update = event(json!({
        "id": "evt_2",
        "type": "payment.succeeded",
        "data": {
            "payment_intent": {
                "id": "pi_1",
                "metadata": { "order_id": order_id.to_string() },
                "shipping": {
                    "phone": "+351 900 000 000",
                    "address": { "city": "", "postal_code": "1000-001" }
                }
            }
        }
    }));
    assert!(!reconciler.reconcile(&intent_update).await.unwrap().transitioned);

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    let body = response_json(response).await;
    let shipping = &body["data"]["shipping_info"];

    assert_eq!(shipping["name"], "Ana Silva");
    assert_eq!(shipping["email"], "ana@example.com");
    assert_eq!(shipping["phone"], "+351 900 000 000");
    assert_eq!(shipping["address"]["city"], "Lisbon");
    assert_eq!(shipping["address"]["postal_code"], "1000-001");
}

#[tokio::test]
async fn unknown_order_event_is_dropped() {
    let app = TestApp::new().await;
    let reconciler = app.state.services.reconciliation.clone();

    let orphan = payment_succeeded(Uuid::new_v4(), "evt_orphan");
    let outcome = reconciler.reconcile(&orphan).await.unwrap();
    assert!(!outcome.transitioned);

    // Over HTTP the provider still gets a 200 so it stops retrying a
    // payload we will never be able to place.
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            Some(serde_json::to_value(&payment_succeeded(Uuid::new_v4(), "evt_orphan2")).unwrap()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_payment_is_terminal() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;
    let reconciler = app.state.services.reconciliation.clone();

    let failed = event(json!({
        "id": "evt_fail",
        "type": "payment.failed",
        "data": {
            "payment_intent": {
                "id": "pi_1",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    }));
    assert!(!reconciler.reconcile(&failed).await.unwrap().transitioned);
    assert_eq!(order_status(&app, order_id).await, "failed");

    // A success report arriving after the failure is stale.
    let outcome = reconciler
        .reconcile(&payment_succeeded(order_id, "evt_late"))
        .await
        .unwrap();
    assert!(!outcome.transitioned);
    assert_eq!(order_status(&app, order_id).await, "failed");
    assert_eq!(app.notifier.paid_count(), 0);
}

#[tokio::test]
async fn canceled_payment_is_terminal() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;
    let reconciler = app.state.services.reconciliation.clone();

    let canceled = event(json!({
        "id": "evt_cancel",
        "type": "payment.canceled",
        "data": {
            "session": {
                "id": "cs_1",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    }));
    assert!(!reconciler.reconcile(&canceled).await.unwrap().transitioned);
    assert_eq!(order_status(&app, order_id).await, "canceled");

    let outcome = reconciler
        .reconcile(&payment_succeeded(order_id, "evt_late"))
        .await
        .unwrap();
    assert!(!outcome.transitioned);
    assert_eq!(order_status(&app, order_id).await, "canceled");
}

#[tokio::test]
async fn webhook_endpoint_processes_provider_payloads() {
    let app = TestApp::new().await;
    let order_id = create_pending_order(&app).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            Some(serde_json::to_value(&payment_succeeded(order_id, "evt_http")).unwrap()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&app, order_id).await, "paid");

    // Event kinds we do not consume are acknowledged without side effects.
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            Some(json!({ "id": "evt_other", "type": "customer.updated", "data": {} })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Malformed payloads are the provider's bug, not a retry case.
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            Some(json!({ "type": 42 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
