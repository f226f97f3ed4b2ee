//! One-shot sync commands, run without the background scheduler.

use std::sync::Arc;

use clap::{Args, Subcommand};

use versetrack::config::Config;
use versetrack::db::{init_db, LocalStore, StoreError};
use versetrack::models::Table;
use versetrack::remote::{GatewayError, PostgrestGateway};
use versetrack::sync::{SyncEngine, SyncOutcome};

/// Push or pull changes, or show what is waiting
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Push unsynced local changes (default)
    Push,
    /// Pull every remote table into the local store
    Pull,
    /// Show remote configuration and unsynced row counts
    Status,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        let pool = init_db(&config.database_path.value).await?;
        let store = LocalStore::new(pool);

        match &self.command {
            None | Some(SyncSubcommand::Push) => self.push(store, config).await,
            Some(SyncSubcommand::Pull) => self.pull(store, config).await,
            Some(SyncSubcommand::Status) => self.status(&store, config).await,
        }
    }

    fn engine(store: LocalStore, config: &Config) -> Result<SyncEngine, SyncCommandError> {
        let gateway = PostgrestGateway::from_config(&config.remote)?;
        Ok(SyncEngine::new(store, Arc::new(gateway), config.sync.pull_policy))
    }

    async fn push(&self, store: LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        let engine = Self::engine(store, config)?;

        println!("Pushing local changes...");
        println!();

        let report = engine.push_all().await;
        print!("{}", report);
        println!();

        match report.outcome() {
            SyncOutcome::Success if report.pushed() == 0 => println!("Already up to date."),
            SyncOutcome::Success => println!("Push complete."),
            SyncOutcome::Retry => {
                println!("Push incomplete; remaining changes will be retried on the next sync.")
            }
            SyncOutcome::PermanentFailure => return Err(SyncCommandError::PushFailed),
        }
        Ok(())
    }

    async fn pull(&self, store: LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        let engine = Self::engine(store, config)?;

        println!("Pulling remote changes...");
        println!();

        let report = engine.pull_all().await?;
        print!("{}", report);
        println!();
        println!("Pull complete.");
        Ok(())
    }

    async fn status(&self, store: &LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Status");
        println!("===========");
        println!();

        match (&config.remote.url, config.remote.is_configured()) {
            (Some(url), true) => println!("Remote:      {}", url),
            _ => {
                println!("Remote:      Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  remote:");
                println!("    url: \"https://your-project.supabase.co\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  VERSETRACK_REMOTE_URL");
                println!("  VERSETRACK_REMOTE_API_KEY");
            }
        }
        println!("Pull policy: {:?}", config.sync.pull_policy);
        println!();

        println!("Unsynced changes:");
        let mut total = 0;
        for table in Table::ALL {
            let count = store.count_dirty(table).await?;
            total += count;
            println!("  {:<26} {}", table, count);
        }
        println!();
        if total == 0 {
            println!("Everything is synced.");
        } else {
            println!("{} change{} waiting to be pushed.", total, if total == 1 { "" } else { "s" });
        }
        Ok(())
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Store(StoreError),
    Gateway(GatewayError),
    PushFailed,
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Store(e) => write!(f, "{}", e),
            SyncCommandError::Gateway(e) => write!(f, "{}", e),
            SyncCommandError::PushFailed => {
                write!(f, "Push failed on a local error; see the log for details")
            }
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Store(e) => Some(e),
            SyncCommandError::Gateway(e) => Some(e),
            SyncCommandError::PushFailed => None,
        }
    }
}

impl From<StoreError> for SyncCommandError {
    fn from(e: StoreError) -> Self {
        SyncCommandError::Store(e)
    }
}

impl From<GatewayError> for SyncCommandError {
    fn from(e: GatewayError) -> Self {
        SyncCommandError::Gateway(e)
    }
}
