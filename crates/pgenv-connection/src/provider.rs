//! Construct-once pool slot

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pgenv_core::{ConnectionPool, Error, PoolFactory, PoolSettings, PooledConnection, Result};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a provider's pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No pool yet and nobody is building one
    Uninitialized,
    /// A caller is parsing the DSN or building the pool
    Initializing,
    /// The pool exists and is reused by every caller
    Ready,
}

/// Owns at most one pool, built on first use
///
/// The DSN passed to the first successful [`acquire`](Self::acquire) decides
/// the pool's configuration. Later DSNs are ignored once the pool exists. A
/// failed or cancelled initialization leaves the slot empty, so the next
/// caller tries again.
pub struct PoolProvider {
    factory: Box<dyn PoolFactory>,
    slot: OnceCell<Arc<dyn ConnectionPool>>,
    initializing: AtomicUsize,
}

impl PoolProvider {
    pub fn new(factory: impl PoolFactory) -> Self {
        Self {
            factory: Box::new(factory),
            slot: OnceCell::new(),
            initializing: AtomicUsize::new(0),
        }
    }

    /// Lease a connection, building the pool from `dsn` if none exists yet
    ///
    /// Concurrent first callers share a single initialization.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the DSN cannot be parsed
    /// - [`Error::PoolConstruction`] if the backend cannot build the pool
    /// - [`Error::Acquisition`] if no lease can be taken or `cancel` fires
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        dsn: &str,
    ) -> Result<Box<dyn PooledConnection>> {
        let pool = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled("pool initialization")),
            pool = self.pool_or_init(dsn) => pool?,
        };

        let connection = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled("connection acquisition")),
            connection = pool.acquire() => connection?,
        };

        tracing::trace!(backend = self.factory.name(), in_use = pool.in_use(), "connection acquired");
        Ok(connection)
    }

    pub fn state(&self) -> PoolState {
        if self.slot.initialized() {
            PoolState::Ready
        } else if self.initializing.load(Ordering::SeqCst) > 0 {
            PoolState::Initializing
        } else {
            PoolState::Uninitialized
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.initialized()
    }

    /// The cached pool, if one has been built
    pub fn pool(&self) -> Option<Arc<dyn ConnectionPool>> {
        self.slot.get().cloned()
    }

    async fn pool_or_init(&self, dsn: &str) -> Result<Arc<dyn ConnectionPool>> {
        self.slot
            .get_or_try_init(|| self.initialize(dsn))
            .await
            .cloned()
    }

    async fn initialize(&self, dsn: &str) -> Result<Arc<dyn ConnectionPool>> {
        let _guard = InitializingGuard::enter(&self.initializing);
        let backend = self.factory.name();

        let settings = PoolSettings::parse(dsn).inspect_err(|e| {
            tracing::error!(backend, error = %e, "failed to parse database DSN");
        })?;

        let pool = self.factory.build(&settings).await.inspect_err(|e| {
            tracing::error!(backend, error = %e, "failed to create database connection pool");
        })?;

        tracing::debug!(backend, max_connections = pool.max_size(), "database connection pool ready");
        Ok(pool)
    }
}

impl fmt::Debug for PoolProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolProvider")
            .field("backend", &self.factory.name())
            .field("state", &self.state())
            .finish()
    }
}

fn cancelled(operation: &str) -> Error {
    Error::Acquisition(format!("{operation} cancelled"))
}

/// Counts in-flight initializations, including ones dropped by cancellation
struct InitializingGuard<'a>(&'a AtomicUsize);

impl<'a> InitializingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
