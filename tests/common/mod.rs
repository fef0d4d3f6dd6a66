#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use sea_orm::{ConnectOptions, Database};
use serde_json::Value;
use storefront_api::{
    app_router,
    config::{AppConfig, NotificationConfig, PaymentProviderConfig},
    db,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    metrics::MetricsRegistry,
    notifications::{NotificationError, Notifier},
    payments::{CreateSessionRequest, PaymentGateway, PaymentSession},
    services::commerce::promotion::{MultiBuyRule, PromotionSettings, ShippingPolicy},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Notifier double that records every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    pub paid: Mutex<Vec<Uuid>>,
    pub shipped: Mutex<Vec<(Uuid, Option<String>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_order_paid(&self, order_id: Uuid) -> Result<(), NotificationError> {
        self.paid.lock().unwrap().push(order_id);
        Ok(())
    }

    async fn notify_order_shipped(
        &self,
        order_id: Uuid,
        tracking_number: Option<&str>,
    ) -> Result<(), NotificationError> {
        self.shipped
            .lock()
            .unwrap()
            .push((order_id, tracking_number.map(str::to_string)));
        Ok(())
    }
}

impl RecordingNotifier {
    pub fn paid_count(&self) -> usize {
        self.paid.lock().unwrap().len()
    }

    pub fn shipped_count(&self) -> usize {
        self.shipped.lock().unwrap().len()
    }
}

mockall::mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_session(
            &self,
            request: CreateSessionRequest,
        ) -> Result<PaymentSession, ServiceError>;
    }
}

/// Gateway that hands out a deterministic session per order.
pub fn default_mock_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().returning(|request| {
        Ok(PaymentSession {
            session_id: format!("cs_test_{}", request.order_id.simple()),
            redirect_url: format!("https://pay.test/s/{}", request.order_id),
        })
    });
    gateway
}

pub fn failing_mock_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_session()
        .returning(|_| Err(ServiceError::GatewayUnavailable("connection refused".into())));
    gateway
}

/// Test application over an in-memory SQLite database. The promotion config
/// activates a buy-3-pay-2 rule on product "A" with a 500-unit shipping fee
/// below 3 payable units.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(default_mock_gateway())).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        let pool = Database::connect(options)
            .await
            .expect("failed to open in-memory sqlite");
        let pool = Arc::new(pool);
        db::ensure_schema(&pool)
            .await
            .expect("failed to create schema");

        let cfg = test_config();
        let metrics = Arc::new(MetricsRegistry::new());
        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let notifier = Arc::new(RecordingNotifier::default());
        tokio::spawn(events::process_events(
            event_rx,
            notifier.clone() as Arc<dyn Notifier>,
            metrics.clone(),
        ));

        let services = AppServices::new(
            pool.clone(),
            Arc::new(event_sender.clone()),
            gateway,
            &cfg,
        );

        let state = AppState {
            db: pool,
            config: cfg,
            event_sender,
            services,
            metrics,
        };

        Self {
            router: app_router(state.clone()),
            state,
            notifier,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 18_080,
        environment: "test".to_string(),
        log_level: "info".to_string(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_acquire_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        currency: "EUR".to_string(),
        payment: PaymentProviderConfig {
            endpoint: "https://payments.test".to_string(),
            api_key: "test_key".to_string(),
            success_url: "https://shop.test/checkout/success".to_string(),
            cancel_url: "https://shop.test/checkout/cancel".to_string(),
            webhook_secret: None,
            webhook_tolerance_secs: 300,
        },
        notifications: NotificationConfig::default(),
        promotion: PromotionSettings {
            name: "MULTI_BUY".to_string(),
            rules: vec![MultiBuyRule {
                product_id: "A".to_string(),
                group_size: 3,
                free_per_group: 1,
            }],
            max_free_items_per_order: 10,
            shipping: ShippingPolicy {
                fee_amount: 500,
                free_threshold_quantity: 3,
                exempt_products: Vec::new(),
            },
        },
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Poll until `cond` holds; the event loop runs on a separate task, so side
/// effects land shortly after the triggering call returns.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}
