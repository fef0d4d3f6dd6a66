use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db = api::db::establish_connection(&cfg)
        .await
        .context("failed to connect to database")?;
    let db = Arc::new(db);
    if cfg.auto_migrate {
        api::db::ensure_schema(&db)
            .await
            .context("failed to create schema")?;
    }

    // Metrics and events
    let metrics = Arc::new(api::metrics::MetricsRegistry::new());
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);

    let notifier: Arc<dyn api::notifications::Notifier> = match &cfg.notifications.webhook_url {
        Some(url) => {
            info!(endpoint = %url, "order notifications enabled");
            Arc::new(api::notifications::HttpNotifier::new(
                url.clone(),
                cfg.notifications.webhook_secret.clone(),
            ))
        }
        None => {
            info!("no notification endpoint configured; notifications disabled");
            Arc::new(api::notifications::NoopNotifier)
        }
    };
    tokio::spawn(api::events::process_events(
        event_rx,
        notifier,
        metrics.clone(),
    ));

    // Payment provider client
    let gateway: Arc<dyn api::payments::PaymentGateway> =
        Arc::new(api::payments::HostedCheckoutGateway::new(
            cfg.payment.endpoint.clone(),
            cfg.payment.api_key.clone(),
        ));

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db.clone(),
        Arc::new(event_sender.clone()),
        gateway,
        &cfg,
    );

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
        metrics,
    };

    let app = api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port configuration")?;
    info!(%addr, "storefront API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
