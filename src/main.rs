//! QAAP CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use qaap::cli::commands::{list, run};
use qaap::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run::execute(*args, cli.json).await,
        Commands::Targets(args) => list::targets(&args, cli.json).map(|()| ExitCode::SUCCESS),
        Commands::Services(args) => list::services(&args, cli.json).map(|()| ExitCode::SUCCESS),
    };

    result.unwrap_or_else(|err| qaap::cli::handle_error(&err, cli.json))
}
