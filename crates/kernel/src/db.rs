//! PostgreSQL pool setup and reachability checks.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Open the pool listings are paginated through.
///
/// Waiting for a free connection is bounded by the same timeout listing
/// statements run under.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(statement_timeout(config))
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Listing statement timeout from config, never below one second.
pub fn statement_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.statement_timeout_secs.max(1))
}

/// Run `SELECT 1`, giving up after `timeout`.
///
/// A slow database reports unhealthy rather than stalling the health route.
pub async fn check_health(pool: &PgPool, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "PostgreSQL health query failed");
            false
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis(), "PostgreSQL health query timed out");
            false
        }
    }
}
