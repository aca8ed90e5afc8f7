//! Leased PostgreSQL connections and transactions

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use deadpool_postgres::Object;
use pgenv_core::{Error, PooledConnection, Result, Transaction, TransactionState};

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    format!("{} (code: {})", message, db_error.code().code())
}

/// A pooled object shared by a connection and its transactions
///
/// The object goes back to the pool when the last holder drops it, unless it
/// was marked for discard, in which case it is detached and closed.
struct Lease {
    object: Option<Object>,
    discard: AtomicBool,
}

impl Lease {
    fn client(&self) -> Result<&Object> {
        self.object
            .as_ref()
            .ok_or_else(|| Error::Query("connection already released".into()))
    }

    fn is_closed(&self) -> bool {
        self.object.as_ref().is_none_or(|object| object.is_closed())
    }

    fn mark_discard(&self) {
        self.discard.store(true, Ordering::SeqCst);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        if self.discard.load(Ordering::SeqCst) {
            tracing::debug!("discarding connection instead of returning it to the pool");
            drop(Object::take(object));
        }
    }
}

/// A connection leased from a [`PostgresPool`](crate::PostgresPool)
///
/// If a transaction started on this connection is still alive, the
/// connection returns to the pool only once that transaction is dropped too.
pub struct PostgresConnection {
    lease: Arc<Lease>,
}

impl PostgresConnection {
    pub(crate) fn new(object: Object) -> Self {
        Self {
            lease: Arc::new(Lease {
                object: Some(object),
                discard: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl PooledConnection for PostgresConnection {
    async fn batch_execute(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing batch");
        self.lease
            .client()?
            .batch_execute(sql)
            .await
            .map_err(|e| Error::Query(format_postgres_error(&e)))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning PostgreSQL transaction");
        self.lease
            .client()?
            .batch_execute("BEGIN")
            .await
            .map_err(|e| {
                Error::Transaction(format!(
                    "Failed to begin transaction: {}",
                    format_postgres_error(&e)
                ))
            })?;

        Ok(Box::new(PostgresTransaction {
            lease: Arc::clone(&self.lease),
            state: TransactionState::Active,
        }))
    }

    fn is_closed(&self) -> bool {
        self.lease.is_closed()
    }

    fn release(self: Box<Self>) {
        tracing::trace!("releasing PostgreSQL connection");
    }
}

/// PostgreSQL transaction wrapper
///
/// Issues `COMMIT` / `ROLLBACK` on the shared connection and remembers which
/// one happened. A transaction dropped while still active marks its
/// connection for discard so an open transaction never leaks into the pool.
pub struct PostgresTransaction {
    lease: Arc<Lease>,
    state: TransactionState,
}

impl PostgresTransaction {
    async fn finish(&mut self, statement: &str, terminal: TransactionState) -> Result<()> {
        if self.state.is_finalized() {
            return Err(Error::TransactionClosed(self.state));
        }

        if self.lease.is_closed() {
            self.state = TransactionState::Aborted;
            return Err(Error::TransactionClosed(self.state));
        }

        let result = self.lease.client()?.batch_execute(statement).await;
        match result {
            Ok(()) => {
                self.state = terminal;
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                self.lease.mark_discard();
                Err(Error::Transaction(format!(
                    "Failed to {} transaction: {}",
                    statement.to_lowercase(),
                    format_postgres_error(&e)
                )))
            }
        }
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            tracing::warn!("PostgreSQL transaction dropped without commit or rollback, discarding its connection");
            self.lease.mark_discard();
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(&mut self) -> Result<()> {
        tracing::debug!("committing PostgreSQL transaction");
        self.finish("COMMIT", TransactionState::Committed).await?;
        tracing::debug!("PostgreSQL transaction committed successfully");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        tracing::debug!("rolling back PostgreSQL transaction");
        self.finish("ROLLBACK", TransactionState::RolledBack).await?;
        tracing::debug!("PostgreSQL transaction rolled back successfully");
        Ok(())
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        if self.state.is_finalized() {
            return Err(Error::TransactionClosed(self.state));
        }
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing batch in transaction");
        self.lease
            .client()?
            .batch_execute(sql)
            .await
            .map_err(|e| Error::Query(format_postgres_error(&e)))
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}
