//! Command-line interface of the `qaap` binary.

pub mod commands;
pub mod inputs;
pub mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::list::ListArgs;
use commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "qaap")]
#[command(about = "QAAP - Quality Analysis and Assurance Pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assess a sample's reads and/or assembly
    Run(Box<RunArgs>),

    /// List the targets a workflow offers
    Targets(ListArgs),

    /// List the services a workflow runs
    Services(ListArgs),
}

/// Report a failed command as a single line and pick the exit code.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ExitCode {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("qaap: {err:#}");
    }
    ExitCode::FAILURE
}
