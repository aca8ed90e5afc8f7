//! In-memory pool backend shared by the unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pgenv_core::{
    ConnectionPool, Error, PoolFactory, PoolSettings, PooledConnection, Result, Transaction,
    TransactionState,
};

/// Mock factory that counts pools built
#[derive(Default)]
pub(crate) struct MockPoolFactory {
    builds: AtomicUsize,
    failures_remaining: AtomicUsize,
    build_delay: Option<Duration>,
    last_settings: Mutex<Option<PoolSettings>>,
}

impl MockPoolFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Slow down every build so concurrent callers overlap
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Fail the next `count` builds
    pub(crate) fn failing(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn last_settings(&self) -> Option<PoolSettings> {
        self.last_settings.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolFactory for MockPoolFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn build(&self, settings: &PoolSettings) -> Result<Arc<dyn ConnectionPool>> {
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::PoolConstruction("mock backend refused".into()));
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        *self.last_settings.lock().unwrap() = Some(settings.clone());
        Ok(Arc::new(MockPool::new(settings.max_connections)))
    }
}

/// Pool that never blocks and tracks outstanding leases
pub(crate) struct MockPool {
    max_size: usize,
    in_use: Arc<AtomicUsize>,
}

impl MockPool {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            max_size,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>> {
        self.in_use.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection::tracked(Arc::clone(&self.in_use))))
    }

    fn size(&self) -> usize {
        self.in_use()
    }

    fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Mock connection that reports when it is released or dropped
pub(crate) struct MockConnection {
    in_use: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl MockConnection {
    fn tracked(in_use: Arc<AtomicUsize>) -> Self {
        Self {
            in_use,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A standalone connection plus a flag set once it is released
    pub(crate) fn standalone() -> (Self, Arc<AtomicBool>) {
        let connection = Self::tracked(Arc::new(AtomicUsize::new(1)));
        let released = Arc::clone(&connection.released);
        (connection, released)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PooledConnection for MockConnection {
    async fn batch_execute(&self, _sql: &str) -> Result<()> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MockTransaction::new(TransactionState::Active)))
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn release(self: Box<Self>) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// How a [`MockTransaction`] responds to rollback
#[derive(Clone, Copy)]
pub(crate) enum RollbackBehavior {
    Succeed,
    Fail,
    Hang,
}

pub(crate) struct MockTransaction {
    state: TransactionState,
    rollback: RollbackBehavior,
    rollbacks: Arc<AtomicUsize>,
}

impl MockTransaction {
    pub(crate) fn new(state: TransactionState) -> Self {
        Self {
            state,
            rollback: RollbackBehavior::Succeed,
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_rollback(mut self, behavior: RollbackBehavior) -> Self {
        self.rollback = behavior;
        self
    }

    /// Counter of rollback attempts, readable after the transaction is consumed
    pub(crate) fn rollback_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.rollbacks)
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(&mut self) -> Result<()> {
        if self.state.is_finalized() {
            return Err(Error::TransactionClosed(self.state));
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.state.is_finalized() {
            return Err(Error::TransactionClosed(self.state));
        }
        match self.rollback {
            RollbackBehavior::Succeed => {
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            RollbackBehavior::Fail => {
                self.state = TransactionState::Aborted;
                Err(Error::Transaction("connection reset by peer".into()))
            }
            RollbackBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn batch_execute(&self, _sql: &str) -> Result<()> {
        if self.state.is_finalized() {
            return Err(Error::TransactionClosed(self.state));
        }
        Ok(())
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}
