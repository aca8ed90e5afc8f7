//! Parsing a DSN into typed pool settings
//!
//! Recognized query keys configure the connection and the pool. Any other key
//! is kept as a server runtime parameter (for example `timezone` or
//! `search_path`) and sent at connection startup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::options::{self, REDACTED};
use crate::{Error, Result};

/// Pool tuning keys understood by other pooling libraries but not applied here
const IGNORED_POOL_KEYS: [&str; 4] = [
    "pool_max_conn_lifetime",
    "pool_max_conn_idle_time",
    "pool_health_check_period",
    "pool_max_conn_lifetime_jitter",
];

/// PostgreSQL `sslmode` values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Returns true if the connection must not fall back to plaintext
    pub fn requires_encryption(&self) -> bool {
        matches!(
            self,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull
        )
    }
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(Error::Configuration(format!("invalid sslmode: {other:?}"))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PostgreSQL `sslcertmode` values (client certificate policy)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslCertMode {
    Disable,
    #[default]
    Allow,
    Require,
}

impl SslCertMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslCertMode::Disable => "disable",
            SslCertMode::Allow => "allow",
            SslCertMode::Require => "require",
        }
    }
}

impl FromStr for SslCertMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disable" => Ok(SslCertMode::Disable),
            "allow" => Ok(SslCertMode::Allow),
            "require" => Ok(SslCertMode::Require),
            other => Err(Error::Configuration(format!(
                "invalid sslcertmode: {other:?}"
            ))),
        }
    }
}

/// Settings for one pool, parsed from a DSN
#[derive(Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Host name, IP address, or unix socket directory
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    /// `None` waits indefinitely (`connect_timeout=0` or unset)
    pub connect_timeout: Option<Duration>,
    pub application_name: Option<String>,
    pub ssl_mode: SslMode,
    pub ssl_cert_mode: SslCertMode,
    pub ssl_root_cert: Option<PathBuf>,
    pub max_connections: usize,
    pub min_connections: usize,
    /// Unrecognized query keys, sent to the server as runtime parameters
    pub runtime_params: BTreeMap<String, String>,
}

impl PoolSettings {
    /// Parse a `postgresql://` or `postgres://` DSN
    ///
    /// The pool size default, when `pool_max_conns` is absent, uses the
    /// current processing-unit count.
    pub fn parse(dsn: &str) -> Result<Self> {
        Self::parse_with_units(dsn, options::processing_units())
    }

    /// Parse with an explicit processing-unit count for the pool size default
    pub fn parse_with_units(dsn: &str, processing_units: usize) -> Result<Self> {
        validate_percent_escapes(dsn)?;

        let url = Url::parse(dsn)
            .map_err(|e| Error::Configuration(format!("invalid DSN: {e}")))?;

        match url.scheme() {
            "postgresql" | "postgres" => {}
            other => {
                return Err(Error::Configuration(format!(
                    "invalid DSN scheme {other:?}, expected \"postgresql\""
                )));
            }
        }

        let mut settings = Self {
            host: authority_host(&url)?.unwrap_or_else(|| options::DEFAULT_HOST.to_string()),
            port: url.port().unwrap_or(5432),
            user: non_empty(decode(url.username())?),
            password: url.password().map(decode).transpose()?.and_then(non_empty),
            dbname: non_empty(decode(url.path().trim_start_matches('/'))?),
            connect_timeout: None,
            application_name: None,
            ssl_mode: SslMode::default(),
            ssl_cert_mode: SslCertMode::default(),
            ssl_root_cert: None,
            max_connections: options::default_max_connections(processing_units),
            min_connections: 0,
            runtime_params: BTreeMap::new(),
        };

        let mut seen = Vec::new();
        for (key, value) in query_pairs(url.query().unwrap_or(""))? {
            // First occurrence of a key wins
            if seen.contains(&key) {
                continue;
            }
            seen.push(key.clone());
            settings.apply(&key, value)?;
        }

        if settings.min_connections > settings.max_connections {
            return Err(Error::Configuration(format!(
                "pool_min_conns ({}) cannot exceed pool_max_conns ({})",
                settings.min_connections, settings.max_connections
            )));
        }

        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: String) -> Result<()> {
        match key {
            "host" => {
                if !value.is_empty() {
                    self.host = value;
                }
            }
            "port" => self.port = parse_number(key, &value)?,
            "user" => self.user = non_empty(value),
            "password" => self.password = non_empty(value),
            "dbname" => self.dbname = non_empty(value),
            "connect_timeout" => {
                let secs: u64 = parse_number(key, &value)?;
                self.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            "application_name" => self.application_name = non_empty(value),
            "sslmode" => self.ssl_mode = value.parse()?,
            "sslcertmode" => self.ssl_cert_mode = value.parse()?,
            "sslrootcert" => self.ssl_root_cert = non_empty(value).map(PathBuf::from),
            "pool_max_conns" => {
                let max: usize = parse_number(key, &value)?;
                if max < 1 {
                    return Err(Error::Configuration(
                        "pool_max_conns must be greater than 0".into(),
                    ));
                }
                self.max_connections = max;
            }
            "pool_min_conns" => self.min_connections = parse_number(key, &value)?,
            key if IGNORED_POOL_KEYS.contains(&key) => {
                tracing::warn!(parameter = %key, "pool parameter is not supported and will be ignored");
            }
            _ => {
                self.runtime_params.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("dbname", &self.dbname)
            .field("connect_timeout", &self.connect_timeout)
            .field("application_name", &self.application_name)
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_cert_mode", &self.ssl_cert_mode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("runtime_params", &self.runtime_params)
            .finish()
    }
}

impl FromStr for PoolSettings {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("invalid {key}: {value:?} is not a valid number")))
}

/// Reject `%` not followed by two hex digits anywhere in the DSN
fn validate_percent_escapes(dsn: &str) -> Result<()> {
    let bytes = dsn.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3);
            if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
                return Err(Error::Configuration(format!(
                    "invalid percent-encoding at byte {i} of DSN"
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn decode(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|value| value.into_owned())
        .map_err(|e| Error::Configuration(format!("DSN component is not valid UTF-8: {e}")))
}

/// Host from the URI authority, with IPv6 brackets removed
fn authority_host(url: &Url) -> Result<Option<String>> {
    let Some(host) = url.host_str() else {
        return Ok(None);
    };
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok(non_empty(decode(host)?))
}

/// Decode an `application/x-www-form-urlencoded` query strictly
fn query_pairs(query: &str) -> Result<Vec<(String, String)>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((
                decode(&key.replace('+', " "))?,
                decode(&value.replace('+', " "))?,
            ))
        })
        .collect()
}
