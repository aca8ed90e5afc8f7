//! Test server discovery and pool fixtures

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use pgenv_core::{ConnectionPool, PoolFactory, PoolSettings};
use pgenv_driver_postgres::PostgresPoolFactory;

/// Environment variable holding the DSN of the test server
pub const TEST_DSN_VAR: &str = "PGENV_TEST_DSN";

/// DSN of the test server, if one is configured
pub fn test_dsn() -> Option<String> {
    env::var(TEST_DSN_VAR)
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
}

/// Build a pool of at most `max_connections` against the test server
///
/// Returns `Ok(None)` when no server is configured so callers can skip.
/// No connections are warmed up, so the pool size only reflects what the
/// test itself opens.
pub async fn test_pool(max_connections: usize) -> Result<Option<Arc<dyn ConnectionPool>>> {
    let Some(dsn) = test_dsn() else {
        eprintln!("{TEST_DSN_VAR} is not set, skipping server-backed test");
        return Ok(None);
    };

    let mut settings = PoolSettings::parse(&dsn).context("invalid test DSN")?;
    settings.max_connections = max_connections;
    settings.min_connections = 0;

    let pool = PostgresPoolFactory::new()
        .build(&settings)
        .await
        .context("failed to build test pool")?;
    Ok(Some(pool))
}
