use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establish a connection pool using the app configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(cfg.database_url.clone());
    options
        .max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(cfg.db_idle_timeout_secs))
        .sqlx_logging(cfg.is_development());

    let pool = Database::connect(options).await?;
    info!("database connection established");
    Ok(pool)
}

/// Create the order tables when they do not exist yet. Works against both
/// the SQLite test databases and Postgres.
pub async fn ensure_schema(db: &DbPool) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut orders = schema.create_table_from_entity(crate::entities::Order);
    orders.if_not_exists();
    db.execute(backend.build(&orders)).await?;

    let mut order_items = schema.create_table_from_entity(crate::entities::OrderItem);
    order_items.if_not_exists();
    db.execute(backend.build(&order_items)).await?;

    Ok(())
}
