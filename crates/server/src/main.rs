mod api;
mod bootstrap;
mod calls;
mod events;
mod health;
mod poll;
mod tasks;
mod usage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use frontdesk_core::config::{AppConfig, LoadOptions};
use frontdesk_db::repositories::{
    SqlCallRepository, SqlRoutingRuleRepository, SqlSubscriptionRepository, SqlTaskRepository,
};

fn init_logging(config: &AppConfig) {
    use frontdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        event_store_mode = if app.events.is_durable() { "durable" } else { "memory" },
        "frontdesk-server started"
    );

    axum::serve(listener, api_router(&app)).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "frontdesk-server stopping");

    Ok(())
}

fn api_router(app: &bootstrap::Application) -> Router {
    let tasks_repo = Arc::new(SqlTaskRepository::new(app.db_pool.clone()));
    let calls_repo = Arc::new(SqlCallRepository::new(app.db_pool.clone()));
    let rules_repo = Arc::new(SqlRoutingRuleRepository::new(app.db_pool.clone()));
    let subscriptions_repo = Arc::new(SqlSubscriptionRepository::new(app.db_pool.clone()));
    let heartbeat = Duration::from_secs(app.config.events.heartbeat_secs);

    Router::new()
        .merge(events::router(app.engine.clone(), heartbeat))
        .merge(tasks::router(tasks_repo, app.events.clone()))
        .merge(calls::router(
            rules_repo,
            calls_repo.clone(),
            app.config.telephony.webhook_secret.clone(),
        ))
        .merge(usage::router(subscriptions_repo, calls_repo))
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
