//! Transaction handle trait and terminal state tracking

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Lifecycle state of a transaction handle
///
/// A handle starts `Active` and moves to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// `BEGIN` succeeded and neither commit nor rollback has happened yet
    Active,
    /// `COMMIT` succeeded
    Committed,
    /// `ROLLBACK` succeeded
    RolledBack,
    /// The underlying connection went away or a commit/rollback failed midway
    Aborted,
}

impl TransactionState {
    /// Returns true once the transaction can no longer be committed or rolled back
    pub fn is_finalized(&self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// A database transaction bound to a leased connection
///
/// Unlike a consuming commit/rollback, both operations take `&mut self` so the
/// handle survives its own resolution and can still report its terminal state.
/// Resolving a finalized transaction fails with
/// [`Error::TransactionClosed`](crate::Error::TransactionClosed).
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(&mut self) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Execute one or more statements within the transaction
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Current lifecycle state
    fn state(&self) -> TransactionState;
}
