//! Error types for pgenv

use thiserror::Error;

use crate::TransactionState;

/// Core error type for pgenv operations
#[derive(Error, Debug)]
pub enum Error {
    /// The DSN could not be turned into pool settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The pooling backend refused to build a pool from valid settings
    #[error("Pool construction error: {0}")]
    PoolConstruction(String),

    /// A lease could not be taken from an existing pool
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// The transaction was already finalized when an operation was attempted
    #[error("Transaction already closed ({0})")]
    TransactionClosed(TransactionState),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Query error: {0}")]
    Query(String),
}

/// Result type alias for pgenv operations
pub type Result<T> = std::result::Result<T, Error>;
