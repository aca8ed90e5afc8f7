//! deadpool-backed connection pool

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use pgenv_core::{ConnectionPool, Error, PooledConnection, Result};

use crate::connection::{PostgresConnection, format_postgres_error};

/// A PostgreSQL pool handing out [`PostgresConnection`] leases
#[derive(Clone)]
pub struct PostgresPool {
    pool: Pool,
}

impl PostgresPool {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn describe_pool_error(error: &PoolError) -> String {
    match error {
        PoolError::Backend(e) => format!("Failed to connect to PostgreSQL: {}", format_postgres_error(e)),
        PoolError::Timeout(kind) => format!("Timed out waiting for connection ({kind:?})"),
        PoolError::Closed => "Pool has been closed".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ConnectionPool for PostgresPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>> {
        let object = self.pool.get().await.map_err(|e| {
            let message = describe_pool_error(&e);
            tracing::debug!(error = %message, "failed to acquire PostgreSQL connection");
            Error::Acquisition(message)
        })?;
        tracing::trace!("PostgreSQL connection acquired");
        Ok(Box::new(PostgresConnection::new(object)))
    }

    fn size(&self) -> usize {
        self.pool.status().size
    }

    fn in_use(&self) -> usize {
        let status = self.pool.status();
        status.size.saturating_sub(status.available)
    }

    fn max_size(&self) -> usize {
        self.pool.status().max_size
    }
}
