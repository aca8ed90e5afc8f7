//! pgenv Connection - shared pool lifecycle
//!
//! A [`PoolProvider`] builds its pool from the first DSN it sees and hands out
//! leases from that pool for the rest of its life. [`release`] resolves an
//! abandoned transaction and returns the connection, never failing.
//!
//! [`connection`] and [`disconnect`] do the same against a process-wide
//! provider backed by PostgreSQL.

mod global;
mod provider;
mod release;

#[cfg(test)]
mod log_capture;
#[cfg(test)]
mod mock;

pub use global::{connection, default_provider, disconnect};
pub use provider::{PoolProvider, PoolState};
pub use release::{ReleaseReport, TransactionOutcome, release};
