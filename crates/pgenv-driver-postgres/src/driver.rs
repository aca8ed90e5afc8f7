//! PostgreSQL pool factory

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pgenv_core::{ConnectionPool, Error, PoolFactory, PoolSettings, Result};
use tokio_postgres::NoTls;

use crate::{PostgresPool, PostgresTlsConnector, pg_config};

/// Builds deadpool-postgres pools from parsed settings
///
/// Pool construction is lazy: no connection is opened until the first
/// acquisition, apart from the background warm-up of `min_connections`.
///
/// Connections handed back to the pool are recycled with a cheap liveness
/// check ([`RecyclingMethod::Fast`]).
#[derive(Debug, Clone)]
pub struct PostgresPoolFactory;

impl PostgresPoolFactory {
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL pool factory initialized");
        Self
    }
}

impl Default for PostgresPoolFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolFactory for PostgresPoolFactory {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip(self, settings), fields(host = %settings.host, port = settings.port, max_connections = settings.max_connections))]
    async fn build(&self, settings: &PoolSettings) -> Result<Arc<dyn ConnectionPool>> {
        let config = pg_config(settings);
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        // Logged by the caller; only map here
        let tls = PostgresTlsConnector::build(settings)
            .map_err(|e| Error::PoolConstruction(e.to_string()))?;

        let manager = match tls {
            Some(tls) => Manager::from_config(config, tls, manager_config),
            None => Manager::from_config(config, NoTls, manager_config),
        };

        let pool = Pool::builder(manager)
            .max_size(settings.max_connections)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::PoolConstruction(format!("Failed to build PostgreSQL pool: {}", e)))?;

        if settings.min_connections > 0 {
            spawn_warm_up(pool.clone(), settings.min_connections);
        }

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            ssl_mode = %settings.ssl_mode,
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "PostgreSQL pool created"
        );
        Ok(Arc::new(PostgresPool::new(pool)))
    }
}

/// Open `count` connections in the background and park them in the pool
fn spawn_warm_up(pool: Pool, count: usize) {
    tokio::spawn(async move {
        let mut held = Vec::with_capacity(count);
        for _ in 0..count {
            match pool.get().await {
                Ok(object) => held.push(object),
                Err(e) => {
                    tracing::warn!(error = %e, opened = held.len(), "PostgreSQL pool warm-up stopped early");
                    break;
                }
            }
        }
        tracing::debug!(opened = held.len(), "PostgreSQL pool warm-up finished");
    });
}
