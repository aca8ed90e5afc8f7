//! Translation of pool settings into a tokio-postgres client configuration

use pgenv_core::{PoolSettings, SslMode};
use tokio_postgres::config::SslMode as PgSslMode;

/// Build the client configuration every pooled connection is opened with
///
/// A host starting with `/` is treated as a unix socket directory by
/// tokio-postgres. Runtime parameters travel in the startup `options`.
pub fn pg_config(settings: &PoolSettings) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config.host(&settings.host).port(settings.port);

    if let Some(user) = &settings.user {
        config.user(user);
    }
    if let Some(password) = &settings.password {
        config.password(password);
    }
    if let Some(dbname) = &settings.dbname {
        config.dbname(dbname);
    }
    if let Some(application_name) = &settings.application_name {
        config.application_name(application_name);
    }
    if let Some(timeout) = settings.connect_timeout {
        config.connect_timeout(timeout);
    }
    if let Some(options) = runtime_options(settings) {
        config.options(&options);
    }

    config.ssl_mode(client_ssl_mode(settings.ssl_mode));
    config
}

/// tokio-postgres only knows disable/prefer/require; certificate checks for
/// the verify modes happen in the TLS connector.
fn client_ssl_mode(mode: SslMode) -> PgSslMode {
    if mode == SslMode::Disable {
        PgSslMode::Disable
    } else if mode.requires_encryption() {
        PgSslMode::Require
    } else {
        PgSslMode::Prefer
    }
}

/// Render runtime parameters as `-c key=value` startup options
///
/// Spaces and backslashes inside keys or values are backslash-escaped, as
/// the server splits the options string on unescaped whitespace.
pub fn runtime_options(settings: &PoolSettings) -> Option<String> {
    if settings.runtime_params.is_empty() {
        return None;
    }

    let options = settings
        .runtime_params
        .iter()
        .map(|(key, value)| format!("-c {}={}", escape_option(key), escape_option(value)))
        .collect::<Vec<_>>()
        .join(" ");
    Some(options)
}

fn escape_option(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
