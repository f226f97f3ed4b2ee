//! One-time wiring of the store, gateway, sync machinery and repositories.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{Config, SyncConfig};
use crate::db::{
    init_db, DailyRecordRepository, LocalStore, PersonalNoteRepository, StoreError,
    VerseRepository,
};
use crate::remote::{GatewayError, MemoryGateway, PostgrestGateway, RemoteGateway};
use crate::sync::{
    Connectivity, PullReport, SchedulerSettings, SyncEngine, SyncHandle, SyncScheduler,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Everything a host needs, built once at startup.
///
/// Repositories hold handles into the shared store and scheduler; there is
/// no global state.
pub struct AppContext {
    pub store: LocalStore,
    pub gateway: Arc<dyn RemoteGateway>,
    pub engine: SyncEngine,
    pub connectivity: Connectivity,
    pub verses: VerseRepository,
    pub daily_records: DailyRecordRepository,
    pub personal_notes: PersonalNoteRepository,
    scheduler: SyncScheduler,
    background: Vec<JoinHandle<()>>,
}

impl AppContext {
    /// Opens the local store and starts the sync scheduler.
    ///
    /// Without a configured remote, writes stay local and the scheduler
    /// waits for a network that never comes.
    pub async fn init(config: &Config) -> Result<Self, AppError> {
        let pool = init_db(&config.database_path.value).await?;
        let store = LocalStore::new(pool);

        let online = config.remote.is_configured();
        let gateway: Arc<dyn RemoteGateway> = if online {
            Arc::new(PostgrestGateway::from_config(&config.remote)?)
        } else {
            tracing::warn!("No remote configured, changes will stay on this device");
            Arc::new(MemoryGateway::offline())
        };

        Ok(Self::with_gateway(
            store,
            gateway,
            Connectivity::new(online),
            &config.sync,
        ))
    }

    /// Wires an already-open store to any gateway.
    pub fn with_gateway(
        store: LocalStore,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: Connectivity,
        sync_config: &SyncConfig,
    ) -> Self {
        let engine = SyncEngine::new(store.clone(), gateway.clone(), sync_config.pull_policy);
        let scheduler = SyncScheduler::start(
            Arc::new(engine.clone()),
            connectivity.clone(),
            SchedulerSettings::from(sync_config),
        );
        let handle = scheduler.handle();
        let reconnect = connectivity.request_sync_on_reconnect(handle.clone());

        Self {
            verses: VerseRepository::new(store.clone(), gateway.clone(), handle.clone()),
            daily_records: DailyRecordRepository::new(
                store.clone(),
                gateway.clone(),
                handle.clone(),
            ),
            personal_notes: PersonalNoteRepository::new(store.clone(), gateway.clone(), handle),
            store,
            gateway,
            engine,
            connectivity,
            scheduler,
            background: vec![reconnect],
        }
    }

    pub fn sync_handle(&self) -> SyncHandle {
        self.scheduler.handle()
    }

    /// Pulls every table once, then seeds default categories if none arrived.
    pub async fn pull_and_seed(&self) -> Result<PullReport, StoreError> {
        let report = self.engine.pull_all().await?;
        self.personal_notes.seed_default_categories().await?;
        Ok(report)
    }

    /// Starts polling `url` for reachability until shutdown.
    pub fn start_probe(&mut self, url: String, interval: Duration) {
        let probe = self.connectivity.spawn_probe(url, interval);
        self.background.push(probe);
    }

    /// Stops background tasks and the scheduler. A sync in progress
    /// finishes first.
    pub async fn shutdown(self) {
        for task in &self.background {
            task.abort();
        }
        self.scheduler.shutdown().await;
        self.store.pool().close().await;
        tracing::info!("Shut down");
    }
}
