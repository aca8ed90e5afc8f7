//! PostgreSQL TLS Support
//!
//! Builds the TLS connector handed to every pooled connection. Certificate
//! verification follows libpq's `sslmode` semantics.

use std::fs;
use std::path::Path;

use native_tls::{Certificate, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use pgenv_core::{PoolSettings, SslCertMode, SslMode};
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, info};

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    /// Client certificates cannot be supplied through the DSN
    #[error("sslcertmode={} requires a client certificate, which is not configurable", .0.as_str())]
    UnsupportedCertMode(SslCertMode),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),
}

/// Builds TLS connectors suitable for use with tokio-postgres
#[derive(Debug, Clone)]
pub struct PostgresTlsConnector;

impl PostgresTlsConnector {
    /// Build a TLS connector from pool settings
    ///
    /// Returns `None` for `sslmode=disable`, in which case connections use
    /// `NoTls`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `sslcertmode=require` is requested
    /// - The root certificate file cannot be read or parsed
    /// - native-tls rejects the resulting configuration
    pub fn build(settings: &PoolSettings) -> Result<Option<MakeTlsConnector>, TlsError> {
        if settings.ssl_cert_mode == SslCertMode::Require {
            return Err(TlsError::UnsupportedCertMode(settings.ssl_cert_mode));
        }

        if settings.ssl_mode == SslMode::Disable {
            debug!("TLS disabled by sslmode");
            return Ok(None);
        }

        info!(mode = %settings.ssl_mode, "Building PostgreSQL TLS connector");

        let mut builder = NativeTlsConnector::builder();

        configure_verification(
            &mut builder,
            settings.ssl_mode,
            settings.ssl_root_cert.is_some(),
        );

        if let Some(path) = &settings.ssl_root_cert {
            apply_root_cert(&mut builder, path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        debug!("TLS connector built successfully");

        Ok(Some(MakeTlsConnector::new(connector)))
    }
}

/// Which checks a given mode performs on the server certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Verification {
    pub(crate) certificate: bool,
    pub(crate) hostname: bool,
}

/// libpq treats `require` with a root certificate like `verify-ca`
pub(crate) fn verification_for(mode: SslMode, has_root_cert: bool) -> Verification {
    match mode {
        SslMode::Disable | SslMode::Allow | SslMode::Prefer => Verification {
            certificate: false,
            hostname: false,
        },
        SslMode::Require => Verification {
            certificate: has_root_cert,
            hostname: false,
        },
        SslMode::VerifyCa => Verification {
            certificate: true,
            hostname: false,
        },
        SslMode::VerifyFull => Verification {
            certificate: true,
            hostname: true,
        },
    }
}

fn configure_verification(builder: &mut TlsConnectorBuilder, mode: SslMode, has_root_cert: bool) {
    let verification = verification_for(mode, has_root_cert);
    debug!(
        certificate = verification.certificate,
        hostname = verification.hostname,
        "Configuring certificate verification"
    );
    builder.danger_accept_invalid_certs(!verification.certificate);
    builder.danger_accept_invalid_hostnames(!verification.hostname);
}

/// Load and apply a PEM-encoded root certificate
fn apply_root_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "Loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;

    builder.add_root_certificate(cert);

    debug!("CA certificate loaded successfully");

    Ok(())
}
