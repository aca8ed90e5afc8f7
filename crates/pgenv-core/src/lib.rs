//! pgenv Core - DSN assembly and pool capability traits
//!
//! This crate provides the pieces every other pgenv crate builds on:
//!
//! - `DsnBuilder` / `build_dsn` - DSN assembly from libpq environment variables
//! - `ConnectionOptions` - the resolved environment values
//! - `PoolSettings` - a DSN parsed into typed pool settings
//! - `PoolFactory`, `ConnectionPool`, `PooledConnection`, `Transaction` -
//!   the capability interface implemented by pooling backends
//! - `Error` - the shared error taxonomy

mod dsn;
mod error;
pub mod options;
mod pool;
mod settings;
mod transaction;

pub use dsn::*;
pub use error::*;
pub use options::ConnectionOptions;
pub use pool::*;
pub use settings::*;
pub use transaction::*;
