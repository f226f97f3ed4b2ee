use std::time::Duration;

use clap::Args;

use versetrack::config::Config;
use versetrack::AppContext;

/// Open the store and keep syncing in the background until Ctrl-C
#[derive(Debug, Args, Default)]
pub struct RunCommand {
    /// Skip the initial pull even if enabled in config
    #[arg(long)]
    no_pull: bool,
}

impl RunCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let mut app = AppContext::init(config).await?;

        if config.remote.is_configured() && config.sync.pull_on_start && !self.no_pull {
            let report = app.pull_and_seed().await?;
            tracing::info!(applied = report.applied(), "Initial pull finished");
        } else {
            app.personal_notes.seed_default_categories().await?;
        }

        if let (Some(url), true) = (&config.remote.url, config.remote.is_configured()) {
            app.start_probe(
                url.clone(),
                Duration::from_secs(config.sync.probe_interval_secs),
            );
        }

        let pending = app.store.count_all_dirty().await?;
        println!("VerseTrack {} running.", versetrack::version());
        println!("Database: {}", config.database_path.value.display());
        println!("Unsynced changes: {}", pending);
        println!("Press Ctrl-C to stop.");

        let mut status = app.sync_handle().subscribe_status();
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = async {
                while status.changed().await.is_ok() {
                    let snapshot = status.borrow_and_update().clone();
                    tracing::debug!(?snapshot, "Sync status changed");
                }
            } => {}
        }

        app.shutdown().await;
        Ok(())
    }
}
