//! tilesource CLI - Command-line interface
//!
//! Resolves vector tile source metadata and loads individual tiles through
//! the tilesource library.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use commands::common::SourceArgs;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "tilesource")]
#[command(version = tilesource::VERSION)]
#[command(about = "Inspect vector tile sources and fetch tiles", long_about = None)]
struct Cli {
    /// Mirror debug logging to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a source and print its metadata
    Info(SourceArgs),

    /// Load one tile from a source
    Fetch(FetchArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config(command) => commands::config::run(command),
        Commands::Info(args) => {
            let runner = CliRunner::new(cli.verbose)?;
            commands::info::run(&runner, args).await
        }
        Commands::Fetch(args) => {
            commands::common::parse_tile(&args.tile)?;
            let runner = CliRunner::new(cli.verbose)?;
            commands::fetch::run(&runner, args).await
        }
    }
}
