//! Network availability as an observable flag.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::SyncHandle;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Connectivity {
    state: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            tracing::info!(online, "Network availability changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Polls `url` every `interval` and publishes whether it answered.
    ///
    /// Any HTTP response counts as reachable. Abort the returned task to stop.
    pub fn spawn_probe(&self, url: String, interval: Duration) -> JoinHandle<()> {
        let connectivity = self.clone();
        tokio::spawn(async move {
            let client = match reqwest::Client::builder()
                .timeout(interval.min(PROBE_TIMEOUT))
                .build()
            {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build connectivity probe client");
                    return;
                }
            };

            loop {
                let reachable = match client.get(&url).send().await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::debug!(%url, error = %e, "Connectivity probe failed");
                        false
                    }
                };
                connectivity.set_online(reachable);
                tokio::time::sleep(interval).await;
            }
        })
    }

    /// Requests a sync every time the network comes back.
    pub fn request_sync_on_reconnect(&self, handle: SyncHandle) -> JoinHandle<()> {
        let mut online = self.subscribe();
        tokio::spawn(async move {
            while online.changed().await.is_ok() {
                if *online.borrow_and_update() {
                    handle.request_sync();
                }
            }
        })
    }
}
