use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, RunCommand, SyncCommand};
use versetrack::config::Config;

#[derive(Parser)]
#[command(name = "versetrack")]
#[command(version)]
#[command(about = "Offline-first verse and devotion tracker with background sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run with background sync until interrupted (default)
    Run(RunCommand),

    /// Push, pull or inspect sync state
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;
    versetrack::logging::init(&config.log_filter.value);

    match cli.command {
        Some(Commands::Run(cmd)) => cmd.run(&config).await?,
        Some(Commands::Sync(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => RunCommand::default().run(&config).await?,
    }

    Ok(())
}
