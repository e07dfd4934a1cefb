//! # toolgate CLI
//!
//! Command-line interface for toolgate - a tool-provider gateway and
//! bounded conversation orchestrator.
//!
//! ## Usage
//!
//! - `toolgate "question"` - Run a single conversation turn
//! - `toolgate tools` - Show the tool catalog grouped by provider

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{run_command, tools_command};

/// toolgate - LLM tool orchestration from the command line
#[derive(Parser)]
#[command(name = "toolgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A gateway and conversation loop for LLM tool providers")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Continue an existing session instead of creating one
    #[arg(short, long)]
    session: Option<String>,

    /// Owner id sessions are created under
    #[arg(short, long, default_value = "local")]
    owner: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// The message to send (if provided, runs a single turn)
    message: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tool catalog grouped by provider
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match (cli.message, cli.command) {
        (Some(message), None) => {
            run_command(message, cli.config, cli.session, cli.owner).await
        }
        (Some(_), Some(_)) => {
            tracing::error!("Error: Cannot specify both a message and a subcommand");
            std::process::exit(1);
        }
        (None, Some(Commands::Tools)) => tools_command(cli.config).await,
        (None, None) => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
