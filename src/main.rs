use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pydevc::cli::Cli;
use pydevc::client::Client;
use pydevc::repl::{Repl, ReplEvents, ReplOptions, ReplState};
use pydevc::source::FileSourceInspector;

/// `--sync` is a reserved flag (`cmdargs.py` parses it but never reads it
/// anywhere) and carries no timeout or other behavior here either.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let repl_state = ReplState::new();
    let events = Arc::new(ReplEvents::new(repl_state.clone()));

    let client = match Client::connect(&cli.addr(), CONNECT_TIMEOUT, events).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("pydevc: {err}");
            std::process::exit(1);
        }
    };

    let options = ReplOptions {
        file: cli.file.clone(),
        autostart: cli.autostart,
        break_at_start: cli.break_at_start,
    };
    let repl = Repl::new(client, repl_state, Box::new(FileSourceInspector), options);

    if let Err(err) = repl.run().await {
        eprintln!("pydevc: {err}");
        std::process::exit(1);
    }
}
