//! Storefront CLI
//!
//! Command-line client for the storefront REST API:
//! 1. `auth login` obtains an access token through the browser
//! 2. `auth credentials` installs the OAuth app credentials
//! 3. `api get|post|put|delete` sends raw requests through the retrying client
//!
//! Failures print one message on stderr and exit with a stable code
//! (`storefront exit-codes`).

mod cli;
mod commands;
mod config;
mod exit;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    // Ctrl-C cancels in-flight requests and the login wait
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let code = match commands::run(cli, cancel, &mut stdout).await {
        Ok(()) => exit::ExitCode::Ok,
        Err(err) => {
            let code = exit::classify(&err);
            debug!(error = ?err, exit_code = code.code(), "command failed");
            eprintln!("Error: {}", exit::user_message(&err));
            code
        }
    };
    std::process::exit(code.code());
}

/// Log to stderr, filtered by LOG_LEVEL / RUST_LOG (default `warn`, or
/// `debug` with `--verbose`).
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
