//! Capability traits for the external pooling backend
//!
//! A [`PoolFactory`] turns parsed [`PoolSettings`] into a [`ConnectionPool`];
//! the pool hands out [`PooledConnection`] leases. Nothing in this crate
//! implements pooling itself.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{PoolSettings, Result, Transaction};

/// Factory trait for constructing connection pools
#[async_trait]
pub trait PoolFactory: Send + Sync + 'static {
    /// Short backend name used in log fields (e.g. "postgres")
    fn name(&self) -> &'static str;

    /// Build a new pool from parsed settings
    async fn build(&self, settings: &PoolSettings) -> Result<Arc<dyn ConnectionPool>>;
}

#[async_trait]
impl<T: PoolFactory> PoolFactory for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn build(&self, settings: &PoolSettings) -> Result<Arc<dyn ConnectionPool>> {
        (**self).build(settings).await
    }
}

/// A constructed pool, safe for concurrent acquire/release
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Take a lease from the pool, waiting if the pool is at capacity
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>>;

    /// Number of open connections, idle or leased
    fn size(&self) -> usize;

    /// Number of leases currently handed out
    fn in_use(&self) -> usize;

    /// Maximum number of connections the pool will open
    fn max_size(&self) -> usize;
}

/// A leased connection, exclusively owned until released
///
/// Dropping a lease also returns it to the pool; [`PooledConnection::release`]
/// makes the hand-back explicit at call sites.
#[async_trait]
pub trait PooledConnection: Send + Sync {
    /// Execute one or more statements without returning rows
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Start a transaction on this connection
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Check whether the underlying connection has been closed
    fn is_closed(&self) -> bool;

    /// Hand the connection back to its pool
    fn release(self: Box<Self>);
}
