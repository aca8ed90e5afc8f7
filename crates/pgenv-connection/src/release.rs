//! Best-effort hand-back of a connection and its transaction

use pgenv_core::{Error, PooledConnection, Transaction, TransactionState};
use tokio_util::sync::CancellationToken;

/// What happened to the transaction passed to [`release`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The transaction was still open and has been rolled back
    RolledBack,
    /// The transaction had already reached this terminal state
    AlreadyClosed(TransactionState),
    /// Rollback failed or was cancelled
    Failed(String),
}

/// Summary of a [`release`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// `None` when no transaction was passed
    pub transaction: Option<TransactionOutcome>,
    pub connection_released: bool,
}

/// Roll back `transaction` if it is still open, then return `connection` to
/// its pool
///
/// Never fails: every problem is logged and recorded in the report. The
/// connection is released even when the rollback fails or is cancelled.
pub async fn release(
    cancel: &CancellationToken,
    connection: Option<Box<dyn PooledConnection>>,
    transaction: Option<Box<dyn Transaction>>,
) -> ReleaseReport {
    let mut report = ReleaseReport::default();

    if let Some(transaction) = transaction {
        report.transaction = Some(resolve_transaction(cancel, transaction).await);
    }

    if let Some(connection) = connection {
        connection.release();
        report.connection_released = true;
    }

    report
}

async fn resolve_transaction(
    cancel: &CancellationToken,
    mut transaction: Box<dyn Transaction>,
) -> TransactionOutcome {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Transaction("rollback cancelled".into())),
        result = transaction.rollback() => result,
    };

    match result {
        Ok(()) => {
            tracing::info!("rolled back database transaction");
            TransactionOutcome::RolledBack
        }
        Err(Error::TransactionClosed(state)) => {
            tracing::info!(%state, "database transaction already {state}");
            TransactionOutcome::AlreadyClosed(state)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to roll back database transaction");
            TransactionOutcome::Failed(e.to_string())
        }
    }
}
