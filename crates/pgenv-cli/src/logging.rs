//! Console logging for the `pgenv` binary

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn,pgenv=info,pgenv_core=info,pgenv_connection=info,pgenv_driver_postgres=info";

/// Install a stderr subscriber so stdout carries only command output
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .try_init()?;

    Ok(())
}
