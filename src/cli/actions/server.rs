use crate::cli::actions::Action;
use crate::identigo::{
    self,
    clock::SystemClock,
    config::CoreConfig,
    context::Services,
    email::LogEmailSender,
    policy::DefaultPolicy,
    storage::PostgresStore,
    telemetry::TracingSink,
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            session_ttl_seconds,
        } => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&dsn)
                .await
                .context("failed to connect to database")?;

            let config = CoreConfig::new()
                .with_session_idle_timeout(Duration::from_secs(session_ttl_seconds));
            let services = Services::new(
                Arc::new(PostgresStore::new(pool)),
                Arc::new(DefaultPolicy),
                Arc::new(LogEmailSender),
                Arc::new(SystemClock::new()),
                Arc::new(TracingSink),
                config,
            );

            identigo::new(port, services).await
        }
    }
}
