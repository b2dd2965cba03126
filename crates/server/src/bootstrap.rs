use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use pedido_agent::{ConversationRuntime, HttpLlmClient};
use pedido_core::catalog::StaticCatalog;
use pedido_core::config::{AppConfig, ConfigError, LoadOptions};
use pedido_core::lifecycle::OrderLifecycleManager;
use pedido_db::repositories::{
    SqlConversationRepository, SqlCustomerRepository, SqlNotificationRepository,
    SqlOrderRepository,
};
use pedido_db::{connect, migrations, DbPool};
use pedido_notify::senders::TransportError;
use pedido_notify::Notifier;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<ConversationRuntime>,
    pub lifecycle: Arc<OrderLifecycleManager>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
    #[error("notification transport setup failed: {0}")]
    Notifier(#[from] TransportError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let customers = Arc::new(SqlCustomerRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let orders = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let audit = Arc::new(SqlNotificationRepository::new(db_pool.clone()));

    let notifier =
        Arc::new(Notifier::from_config(&config.notifications, audit, customers.clone())?);
    let mut lifecycle = OrderLifecycleManager::new(orders).with_notifier(notifier);
    if !config.catalog.entries.is_empty() {
        lifecycle = lifecycle
            .with_catalog(Arc::new(StaticCatalog::new(config.catalog.entries.clone())));
    }
    let lifecycle = Arc::new(lifecycle);

    let llm = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );
    let runtime =
        Arc::new(ConversationRuntime::new(customers, conversations, lifecycle.clone(), llm));

    info!(
        event_name = "system.bootstrap.wired",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        "application components wired"
    );

    Ok(Application { config, db_pool, runtime, lifecycle })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use pedido_core::catalog::CatalogEntry;
    use pedido_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use pedido_core::domain::customer::CustomerId;
    use pedido_core::domain::order::LineItem;

    use crate::bootstrap::{bootstrap, bootstrap_with_config};

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_migrates_and_wires_components() {
        let app = bootstrap(memory_options()).await.expect("bootstrap succeeds");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('customer', 'customer_order', 'order_line', 'conversation_turn', 'notification')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline order-path tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn configured_catalog_prices_unpriced_items_at_create() {
        // Named in-memory database so this test migrates its own store.
        let options = LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(
                    "sqlite:file:catalog_bootstrap?mode=memory&cache=shared".to_string(),
                ),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };
        let mut config = AppConfig::load(options).expect("config");
        config.catalog.entries.push(CatalogEntry {
            name: "Margherita Pizza".to_string(),
            aliases: vec!["pizza".to_string()],
            unit_price: Decimal::new(1250, 2),
        });

        let app = bootstrap_with_config(config).await.expect("bootstrap succeeds");
        sqlx::query(
            "INSERT INTO customer (id, identity, display_name, created_at) VALUES (?, ?, NULL, ?)",
        )
        .bind("C-1")
        .bind("+15550001111")
        .bind(Utc::now().to_rfc3339())
        .execute(&app.db_pool)
        .await
        .expect("seed customer");

        let order = app
            .lifecycle
            .create_order(
                CustomerId("C-1".to_string()),
                vec![LineItem {
                    name: "pizza".to_string(),
                    quantity: 2,
                    unit_price: None,
                    special_instructions: None,
                }],
            )
            .await
            .expect("create order");

        assert_eq!(order.items[0].unit_price, Some(Decimal::new(1250, 2)));
        assert_eq!(order.total(), Decimal::new(2500, 2));

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_unreachable_database() {
        let options = LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite:///nonexistent-dir/pedido.db".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };
        assert!(bootstrap(options).await.is_err());
    }
}
