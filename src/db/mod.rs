//! Postgres backing for the alert ledger, disputes and account suspension
//!
//! Postgres is optional: without `DATABASE_URL` the service runs on in-memory
//! repositories and [`connect`] returns `None`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

/// Database setup errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Failed to apply fraudwatch migrations: {0}")]
    Migrate(String),

    #[error("Database ping failed: {0}")]
    Ping(String),
}

/// Open the pool and bring the schema up to date, or `None` in in-memory mode
pub async fn connect(config: &Config) -> Result<Option<PgPool>, DbError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("No DATABASE_URL configured, persistence stays in memory");
        return Ok(None);
    };
    let masked = config.database_url_masked().unwrap_or_default();

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(url)
        .await
        .map_err(|e| DbError::Connect {
            url: masked.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!(
        database = %masked,
        max_connections = config.db_max_connections,
        "Postgres pool ready"
    );

    migrate(&pool).await?;

    Ok(Some(pool))
}

/// Apply `migrations/` (alert, dispute and evidence tables)
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::Migrate(e.to_string()))?;

    tracing::info!("Schema migrations applied");

    Ok(())
}

/// Round-trip a trivial query; used by `/health`
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| DbError::Ping(e.to_string()))?;

    Ok(())
}
