//! Process-wide PostgreSQL pool

use std::sync::LazyLock;

use pgenv_core::{PooledConnection, Result, Transaction};
use pgenv_driver_postgres::PostgresPoolFactory;
use tokio_util::sync::CancellationToken;

use crate::{PoolProvider, ReleaseReport, release};

static DEFAULT_PROVIDER: LazyLock<PoolProvider> =
    LazyLock::new(|| PoolProvider::new(PostgresPoolFactory::new()));

/// The provider behind [`connection`], shared by the whole process
pub fn default_provider() -> &'static PoolProvider {
    &DEFAULT_PROVIDER
}

/// Lease a connection from the process-wide pool
///
/// The first successful call builds the pool from `dsn`, typically the output
/// of [`pgenv_core::build_dsn`]. Later calls reuse it.
pub async fn connection(
    cancel: &CancellationToken,
    dsn: &str,
) -> Result<Box<dyn PooledConnection>> {
    DEFAULT_PROVIDER.acquire(cancel, dsn).await
}

/// Roll back an open transaction and return the connection to the
/// process-wide pool. See [`release`].
pub async fn disconnect(
    cancel: &CancellationToken,
    connection: Option<Box<dyn PooledConnection>>,
    transaction: Option<Box<dyn Transaction>>,
) -> ReleaseReport {
    release(cancel, connection, transaction).await
}
