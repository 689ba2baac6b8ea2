use std::sync::Arc;

use frontdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use frontdesk_db::repositories::{SqlTaskEventRepository, SqlTaskRepository};
use frontdesk_db::{connect_with_settings, migrations, DbPool, EventStore};
use thiserror::Error;
use tracing::info;

use crate::poll::{PollEngine, PollSettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub events: Arc<EventStore>,
    pub engine: Arc<PollEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let events = Arc::new(if config.events.durable {
        EventStore::durable(
            Arc::new(SqlTaskEventRepository::new(db_pool.clone())),
            config.events.memory_capacity,
        )
    } else {
        EventStore::in_memory(config.events.memory_capacity)
    });
    info!(
        event_name = "system.bootstrap.event_store_mode",
        mode = if events.is_durable() { "durable" } else { "memory" },
        "event store initialized"
    );

    let engine = Arc::new(PollEngine::new(
        events.clone(),
        Arc::new(SqlTaskRepository::new(db_pool.clone())),
        PollSettings::from_config(&config.events),
    ));

    Ok(Application { config, db_pool, events, engine })
}

#[cfg(test)]
mod tests {
    use frontdesk_core::config::{ConfigOverrides, LoadOptions};
    use frontdesk_core::cursor::Cursor;
    use frontdesk_core::domain::event::{TaskEventKind, TenantId};

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str, durable: bool) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                events_durable: Some(durable),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_durable_event_store() {
        let app = bootstrap(options("sqlite::memory:?cache=shared", true))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('task', 'task_event', 'call_record', 'subscription')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables to be available after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose the baseline event-path tables");

        assert!(app.events.is_durable());

        // The publish -> poll path works end to end on a fresh bootstrap.
        let tenant = TenantId("acme-dental".to_string());
        let before = Cursor::at(chrono::Utc::now() - chrono::Duration::seconds(1));
        app.events
            .publish(&tenant, TaskEventKind::Created, "task-1", serde_json::json!({}))
            .await
            .expect("publish");
        let outcome = app.engine.poll(&tenant, Some(before), 0).await;
        assert_eq!(outcome.events.len(), 1);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_honors_the_memory_only_event_mode() {
        let app = bootstrap(options("sqlite::memory:", false))
            .await
            .expect("bootstrap should succeed");

        assert!(!app.events.is_durable());
        app.db_pool.close().await;
    }
}
