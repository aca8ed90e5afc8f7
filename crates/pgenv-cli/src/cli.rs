//! pgenv CLI
//!
//! Prints the DSN assembled from libpq-style `PG*` environment variables and
//! checks that a pool built from it can reach the server.
//!
//! ## Usage
//!
//! ```bash
//! pgenv dsn --redact
//! pgenv options
//! pgenv check --timeout-secs 5
//! PGHOST=db pgenv --warn-missing --warn-empty dsn
//! ```

mod commands;
mod logging;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pgenv")]
#[command(about = "PostgreSQL DSN and pool helper driven by PG* environment variables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    warnings: WarningArgs,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Environment variable warnings
#[derive(Args, Debug, Default, Clone)]
struct WarningArgs {
    /// Warn about watched variables that are not set
    #[arg(long, global = true)]
    warn_missing: bool,

    /// Warn about watched variables that are set to an empty string
    #[arg(long, global = true)]
    warn_empty: bool,

    /// Variables to watch (defaults to every recognized PG* variable)
    #[arg(long, global = true, value_delimiter = ',', value_name = "VARS")]
    watch: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the DSN built from the environment
    Dsn {
        /// Replace the password with *****
        #[arg(long)]
        redact: bool,
    },

    /// Print the resolved connection options as JSON (password redacted)
    Options,

    /// Acquire a pooled connection and run `SELECT 1`
    Check {
        /// Connect with this DSN instead of the one built from the environment
        #[arg(long, env = "PGENV_DSN", hide_env_values = true)]
        dsn: Option<String>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 10, value_name = "SECS")]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let builder = commands::dsn_builder(&cli.warnings);

    match cli.command {
        Command::Dsn { redact } => println!("{}", commands::dsn(&builder, redact)),
        Command::Options => println!("{}", commands::options_json(&builder)?),
        Command::Check { dsn, timeout_secs } => {
            let dsn = dsn.unwrap_or_else(|| builder.build());
            let report = commands::check(&dsn, timeout_secs).await?;
            println!("{report}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
