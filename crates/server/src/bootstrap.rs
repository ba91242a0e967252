use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tripflow_core::config::{AppConfig, ConfigError};
use tripflow_core::{NotificationDispatcher, NotificationError};
use tripflow_db::{
    connect_with_config, migrations, DbPool, SqlRoleResolver, SqlTravelRequestRepository,
};
use tripflow_workflow::TravelWorkflowService;

use crate::notify;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: TravelWorkflowService,
    pub notification_transport: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification transport could not be initialized: {0}")]
    Notifications(#[source] NotificationError),
}

/// Connects, migrates and wires the workflow service. Must run inside a tokio runtime because
/// the notification worker is spawned here.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let sink =
        notify::sink_from_config(&config.notifications).map_err(BootstrapError::Notifications)?;
    let notification_transport =
        if config.notifications.webhook_url.is_some() { "webhook" } else { "log" };
    let dispatcher = NotificationDispatcher::spawn(sink, config.notifications.queue_capacity);

    let service = TravelWorkflowService::new(
        Arc::new(SqlTravelRequestRepository::new(db_pool.clone())),
        Arc::new(SqlRoleResolver::new(db_pool.clone())),
        dispatcher,
        config.workflow.policy(),
    );

    Ok(Application { config, db_pool, service, notification_transport })
}
