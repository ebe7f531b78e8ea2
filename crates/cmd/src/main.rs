use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::commands::{ServeArgs, library_command, serve_command};
use cmd::resolve_config;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "sheet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file (default: $SHEETLOG_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV dataset and serve JSON requests, one per line
    Serve(ServeArgs),
    /// Print the built-in function library
    Library,
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;
    let mut stdout = std::io::stdout();

    match &cli.command {
        Commands::Serve(args) => serve_command(&config, args, &mut stdout).await,
        Commands::Library => library_command(&mut stdout),
    }
}
