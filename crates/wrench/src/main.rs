//! wrench - a coding agent for your terminal

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{chat_command, init_command, status_command};

/// wrench - coding agent for your terminal
#[derive(Parser)]
#[command(name = "wrench")]
#[command(about = "A coding agent that reads, writes, searches and runs commands in one directory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the config file
    Init,
    /// Chat with the agent
    Chat {
        /// Send one message and exit
        #[arg(short, long)]
        message: Option<String>,
        /// Working directory the agent is confined to
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
    },
    /// Show configuration and tool status
    Status,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Chat { message, dir } => chat_command(message, dir).await,
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
