//! Connection options resolved from libpq-style environment variables
//!
//! See <https://www.postgresql.org/docs/current/libpq-envars.html> for the
//! variables this module reads. Two extra variables, `PGPOOLMAXCONNECTIONS`
//! and `PGPOOLMINCONNECTIONS`, size the pool.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

pub const PGHOST: &str = "PGHOST";
pub const PGUSER: &str = "PGUSER";
pub const PGPASSWORD: &str = "PGPASSWORD";
pub const PGPORT: &str = "PGPORT";
pub const PGCONNECT_TIMEOUT: &str = "PGCONNECT_TIMEOUT";
pub const PGAPPNAME: &str = "PGAPPNAME";
pub const PGSSLMODE: &str = "PGSSLMODE";
pub const PGSSLCERTMODE: &str = "PGSSLCERTMODE";
pub const PGSSLROOTCERT: &str = "PGSSLROOTCERT";
pub const PGPOOLMAXCONNECTIONS: &str = "PGPOOLMAXCONNECTIONS";
pub const PGPOOLMINCONNECTIONS: &str = "PGPOOLMINCONNECTIONS";
pub const PGTZ: &str = "PGTZ";

/// Every environment variable consulted by [`ConnectionOptions::resolve`]
pub const ENVIRONMENT_VARIABLES: [&str; 12] = [
    PGHOST,
    PGUSER,
    PGPASSWORD,
    PGPORT,
    PGCONNECT_TIMEOUT,
    PGAPPNAME,
    PGSSLMODE,
    PGSSLCERTMODE,
    PGSSLROOTCERT,
    PGPOOLMAXCONNECTIONS,
    PGPOOLMINCONNECTIONS,
    PGTZ,
];

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "5432";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MIN_CONNECTIONS: usize = 1;
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Floor for the computed `pool_max_conns` default
pub const MIN_DEFAULT_MAX_CONNECTIONS: usize = 4;

/// Number of processing units available to this process
///
/// Falls back to 1 when the platform cannot report parallelism.
pub fn processing_units() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Default maximum pool size: the larger of 4 and the processing-unit count
pub fn default_max_connections(processing_units: usize) -> usize {
    processing_units.max(MIN_DEFAULT_MAX_CONNECTIONS)
}

/// Fully resolved connection options
///
/// Every field is a string as read from the environment, with documented
/// defaults applied. An empty string means "not set" and is left out of the
/// serialized DSN.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: String,
    pub connect_timeout: String,
    pub application_name: String,
    pub sslmode: String,
    pub sslcertmode: String,
    pub sslrootcert: String,
    pub pool_max_conns: String,
    pub pool_min_conns: String,
    /// Informational only: not a DSN key, so pools built from the DSN never
    /// see it. Put `timezone=<zone>` in the DSN query to set the session
    /// timezone; it is forwarded as a runtime parameter.
    pub timezone: String,
}

impl ConnectionOptions {
    /// Resolve options through an environment lookup
    ///
    /// A variable that is absent or whitespace-only falls back to its default;
    /// any other value is kept verbatim.
    pub fn resolve<F>(lookup: F, processing_units: usize) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| -> String {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_default()
        };
        let or_default = |name: &str, default: String| -> String {
            let value = read(name);
            if value.is_empty() { default } else { value }
        };

        Self {
            host: or_default(PGHOST, DEFAULT_HOST.to_string()),
            user: read(PGUSER),
            password: read(PGPASSWORD),
            port: or_default(PGPORT, DEFAULT_PORT.to_string()),
            connect_timeout: or_default(
                PGCONNECT_TIMEOUT,
                DEFAULT_CONNECT_TIMEOUT_SECS.to_string(),
            ),
            application_name: read(PGAPPNAME),
            sslmode: read(PGSSLMODE),
            sslcertmode: read(PGSSLCERTMODE),
            sslrootcert: read(PGSSLROOTCERT),
            pool_max_conns: or_default(
                PGPOOLMAXCONNECTIONS,
                default_max_connections(processing_units).to_string(),
            ),
            pool_min_conns: or_default(PGPOOLMINCONNECTIONS, DEFAULT_MIN_CONNECTIONS.to_string()),
            timezone: or_default(PGTZ, DEFAULT_TIMEZONE.to_string()),
        }
    }

    /// Resolve options from the process environment
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok(), processing_units())
    }

    /// DSN query parameters with non-blank values, keyed by their DSN names
    ///
    /// `host` is the URI authority and `timezone` is not a DSN key, so neither
    /// appears here.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("user", self.user.as_str()),
            ("password", self.password.as_str()),
            ("port", self.port.as_str()),
            ("connect_timeout", self.connect_timeout.as_str()),
            ("application_name", self.application_name.as_str()),
            ("pool_max_conns", self.pool_max_conns.as_str()),
            ("pool_min_conns", self.pool_min_conns.as_str()),
            ("sslmode", self.sslmode.as_str()),
            ("sslcertmode", self.sslcertmode.as_str()),
            ("sslrootcert", self.sslrootcert.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
    }

    /// Copy of these options with the password masked
    pub fn redacted(&self) -> Self {
        let mut options = self.clone();
        if !options.password.is_empty() {
            options.password = REDACTED.to_string();
        }
        options
    }
}

pub(crate) const REDACTED: &str = "*****";

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = self.redacted();
        f.debug_struct("ConnectionOptions")
            .field("host", &redacted.host)
            .field("user", &redacted.user)
            .field("password", &redacted.password)
            .field("port", &redacted.port)
            .field("connect_timeout", &redacted.connect_timeout)
            .field("application_name", &redacted.application_name)
            .field("sslmode", &redacted.sslmode)
            .field("sslcertmode", &redacted.sslcertmode)
            .field("sslrootcert", &redacted.sslrootcert)
            .field("pool_max_conns", &redacted.pool_max_conns)
            .field("pool_min_conns", &redacted.pool_min_conns)
            .field("timezone", &redacted.timezone)
            .finish()
    }
}
