//! stravajson CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use stravajson_client::cli::{Cli, Command};
use stravajson_client::commands::{fetch, init};
use stravajson_client::error::ClientResult;
use stravajson_client::interrupt::run_interruptible;
use stravajson_client::{CredentialStore, Settings};
use stravajson_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.verbose {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run_interruptible(run(cli), tokio::signal::ctrl_c()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    match cli.command {
        Command::Init(args) => init::run(args, &CredentialStore::at_default_path()),
        Command::Fetch(args) => {
            let settings = Settings::from_env()?;
            fetch::run(args, &settings).await
        }
    }
}
