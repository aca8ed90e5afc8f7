//! Subcommand implementations

use std::time::Duration;

use anyhow::{Context, anyhow};
use pgenv_core::{DsnBuilder, options, render_dsn};
use tokio_util::sync::CancellationToken;

use crate::WarningArgs;

/// DSN builder over the process environment with the requested warnings
pub fn dsn_builder(args: &WarningArgs) -> DsnBuilder<'static> {
    configure(DsnBuilder::from_env(), args)
}

fn configure<'a>(builder: DsnBuilder<'a>, args: &WarningArgs) -> DsnBuilder<'a> {
    let builder = if args.watch.is_empty() {
        builder.watch(options::ENVIRONMENT_VARIABLES)
    } else {
        builder.watch(args.watch.iter().cloned())
    };

    builder
        .warn_on_missing(args.warn_missing)
        .warn_on_empty(args.warn_empty)
}

pub fn dsn(builder: &DsnBuilder<'_>, redact: bool) -> String {
    if redact {
        builder.check_variables();
        render_dsn(&builder.options().redacted())
    } else {
        builder.build()
    }
}

pub fn options_json(builder: &DsnBuilder<'_>) -> anyhow::Result<String> {
    builder.check_variables();
    serde_json::to_string_pretty(&builder.options().redacted())
        .context("failed to serialize connection options")
}

/// Acquire a connection from the process-wide pool and run `SELECT 1`
///
/// Gives up once `timeout_secs` elapse or Ctrl-C is pressed.
pub async fn check(dsn: &str, timeout_secs: u64) -> anyhow::Result<String> {
    let cancel = CancellationToken::new();
    let deadline = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                    tracing::warn!(timeout_secs, "check timed out");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("check interrupted");
                }
            }
            cancel.cancel();
        })
    };

    let result = run_check(&cancel, dsn).await;
    deadline.abort();
    result
}

async fn run_check(cancel: &CancellationToken, dsn: &str) -> anyhow::Result<String> {
    let connection = pgenv_connection::connection(cancel, dsn)
        .await
        .context("failed to acquire a connection")?;

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("SELECT 1 cancelled")),
        result = connection.batch_execute("SELECT 1") => result.context("SELECT 1 failed"),
    };

    let pool = pgenv_connection::default_provider().pool();
    pgenv_connection::disconnect(cancel, Some(connection), None).await;
    outcome?;

    Ok(match pool {
        Some(pool) => format!(
            "ok ({} of {} pooled connections in use)",
            pool.in_use(),
            pool.max_size()
        ),
        None => "ok".to_string(),
    })
}
