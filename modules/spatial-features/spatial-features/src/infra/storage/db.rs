use anyhow::Context;
use sea_orm::{DatabaseConnection, SqlxPostgresConnector};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// Build the Postgres pool and wrap it in a sea-orm connection.
///
/// # Errors
/// Returns an error if the pool cannot establish its first connection.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<DatabaseConnection> {
    let mut opts = PgPoolOptions::new()
        .max_connections(cfg.max_conns)
        .min_connections(cfg.min_conns)
        .acquire_timeout(cfg.acquire_timeout);
    if let Some(t) = cfg.idle_timeout {
        opts = opts.idle_timeout(t);
    }

    // The URL may carry credentials; keep it out of the error chain.
    let pool = opts
        .connect(&cfg.url)
        .await
        .context("failed to connect to database")?;

    match sqlx::query_scalar::<_, String>("SELECT postgis_full_version()")
        .fetch_one(&pool)
        .await
    {
        Ok(version) => info!(postgis = %version, max_conns = cfg.max_conns, "Database pool ready"),
        Err(e) => warn!(error = %e, "PostGIS extension not available; spatial calls will fail"),
    }

    Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
}
