//! DSN assembly from the process environment
//!
//! The DSN is a `postgresql://<host>?<query>` URI. Parameters with blank
//! values are dropped instead of being written as `key=`, so the pooling
//! backend applies its own defaults for them.

use std::net::Ipv6Addr;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::form_urlencoded;

use crate::options::{self, ConnectionOptions};

/// Characters escaped in the host component
///
/// Anything that would end the authority early or be read as a port or
/// userinfo separator is escaped. A trailing `:<port>` is handled separately.
const HOST_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Which environment problems [`DsnBuilder`] should log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvWarnings {
    /// Warn when a watched variable is set to an empty (or blank) string
    pub empty: bool,
    /// Warn when a watched variable is not set at all
    pub missing: bool,
}

/// A problem found with a watched environment variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvIssue {
    Missing(String),
    Empty(String),
}

/// Builds a DSN from an environment lookup
///
/// The lookup and the processing-unit count are injectable so callers (and
/// tests) can pin them:
///
/// ```
/// use pgenv_core::DsnBuilder;
///
/// let dsn = DsnBuilder::with_lookup(|name| (name == "PGUSER").then(|| "app".to_string()))
///     .processing_units(|| 2)
///     .build();
///
/// assert!(dsn.starts_with("postgresql://localhost?"));
/// assert!(dsn.contains("user=app"));
/// assert!(dsn.contains("pool_max_conns=4"));
/// ```
pub struct DsnBuilder<'a> {
    lookup: Box<dyn Fn(&str) -> Option<String> + 'a>,
    processing_units: Box<dyn Fn() -> usize + 'a>,
    watched: Vec<String>,
    warnings: EnvWarnings,
}

impl DsnBuilder<'static> {
    /// Builder reading the real process environment
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }
}

impl<'a> DsnBuilder<'a> {
    /// Builder reading variables through `lookup`
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'a,
    {
        Self {
            lookup: Box::new(lookup),
            processing_units: Box::new(options::processing_units),
            watched: Vec::new(),
            warnings: EnvWarnings::default(),
        }
    }

    /// Override the processing-unit provider used for the `pool_max_conns` default
    pub fn processing_units<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> usize + 'a,
    {
        self.processing_units = Box::new(provider);
        self
    }

    /// Add variables to check when warnings are enabled
    pub fn watch<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watched.extend(variables.into_iter().map(Into::into));
        self
    }

    pub fn warn_on_missing(mut self, enabled: bool) -> Self {
        self.warnings.missing = enabled;
        self
    }

    pub fn warn_on_empty(mut self, enabled: bool) -> Self {
        self.warnings.empty = enabled;
        self
    }

    pub fn warnings(mut self, warnings: EnvWarnings) -> Self {
        self.warnings = warnings;
        self
    }

    /// Resolve the options the DSN would be built from
    pub fn options(&self) -> ConnectionOptions {
        ConnectionOptions::resolve(&*self.lookup, (self.processing_units)())
    }

    /// Check watched variables, logging a warning for each enabled issue
    pub fn check_variables(&self) -> Vec<EnvIssue> {
        let mut issues = Vec::new();

        for name in &self.watched {
            match (self.lookup)(name) {
                None if self.warnings.missing => {
                    tracing::warn!(variable = %name, "environment variable is not set");
                    issues.push(EnvIssue::Missing(name.clone()));
                }
                Some(value) if self.warnings.empty && value.trim().is_empty() => {
                    tracing::warn!(variable = %name, "environment variable is set to an empty string");
                    issues.push(EnvIssue::Empty(name.clone()));
                }
                _ => {}
            }
        }

        issues
    }

    /// Build the DSN string
    pub fn build(&self) -> String {
        self.check_variables();
        render_dsn(&self.options())
    }
}

/// Build a DSN from the process environment
pub fn build_dsn() -> String {
    DsnBuilder::from_env().build()
}

/// Serialize resolved options as a `postgresql://` URI
///
/// Query keys are written in sorted order; callers must not rely on it.
pub fn render_dsn(options: &ConnectionOptions) -> String {
    let mut pairs = options.query_pairs();
    pairs.sort_by_key(|(key, _)| *key);

    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
    let query = query.finish();

    let host = if options.host.trim().is_empty() {
        encode_host(options::DEFAULT_HOST)
    } else {
        encode_host(&options.host)
    };

    if query.is_empty() {
        format!("postgresql://{host}")
    } else {
        format!("postgresql://{host}?{query}")
    }
}

/// Encode a host for the URI authority, keeping a valid trailing port
fn encode_host(host: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        return format!("[{host}]");
    }
    if is_bracketed_ipv6(host) {
        return host.to_string();
    }

    if let Some((name, port)) = host.rsplit_once(':') {
        let valid_port = !port.is_empty()
            && port.bytes().all(|b| b.is_ascii_digit())
            && port.parse::<u16>().is_ok();
        if valid_port {
            if is_bracketed_ipv6(name) {
                return format!("{name}:{port}");
            }
            if !name.is_empty() && !name.contains(':') {
                return format!("{}:{port}", utf8_percent_encode(name, HOST_ENCODE_SET));
            }
        }
    }

    utf8_percent_encode(host, HOST_ENCODE_SET).to_string()
}

fn is_bracketed_ipv6(host: &str) -> bool {
    host.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|inner| inner.parse::<Ipv6Addr>().is_ok())
}

#[cfg(test)]
mod tests;
