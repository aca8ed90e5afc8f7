//! PostgreSQL pooling backend
//!
//! Implements the pgenv capability traits on top of `deadpool-postgres`
//! and `tokio-postgres`, with TLS through `native-tls`.

mod config;
mod connection;
mod driver;
mod pool;
mod tls;

pub use config::{pg_config, runtime_options};
pub use connection::{PostgresConnection, PostgresTransaction};
pub use driver::PostgresPoolFactory;
pub use pool::PostgresPool;
pub use tls::{PostgresTlsConnector, TlsError};
