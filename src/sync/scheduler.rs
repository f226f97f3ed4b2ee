//! Background sync scheduling.
//!
//! One worker task owns the run loop. Requests from anywhere in the app go
//! through a capacity-1 channel, so any number of requests made while one is
//! already queued collapse into a single run. The worker debounces, waits
//! for connectivity, runs the job and retries with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{Connectivity, ExponentialBackoff};
use crate::config::SyncConfig;

/// Result of one sync run, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    /// Transient failure; run again after a backoff delay.
    Retry,
    /// Retrying will not help; wait for the next request.
    PermanentFailure,
}

/// The unit of work the scheduler runs.
#[async_trait]
pub trait SyncJob: Send + Sync + 'static {
    async fn run(&self) -> SyncOutcome;

    /// Whether durable work is waiting from a previous session.
    async fn has_pending(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub debounce: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            min_backoff: Duration::from_millis(10_000),
            max_backoff: Duration::from_millis(18_000_000),
        }
    }
}

impl From<&SyncConfig> for SchedulerSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            min_backoff: Duration::from_millis(config.min_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Snapshot of the worker, published after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub waiting_for_network: bool,
    pub runs: u64,
    pub consecutive_failures: u32,
    pub last_outcome: Option<SyncOutcome>,
    /// Set while sleeping before a retry.
    pub backoff: Option<Duration>,
}

/// Cheap, cloneable entry point for requesting syncs.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    requests: mpsc::Sender<()>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    pub(crate) fn new(requests: mpsc::Sender<()>, status: watch::Receiver<SyncStatus>) -> Self {
        Self { requests, status }
    }

    /// A handle with no scheduler behind it. Requests are dropped.
    pub fn detached() -> Self {
        let (requests, _) = mpsc::channel(1);
        let (_, status) = watch::channel(SyncStatus::default());
        Self::new(requests, status)
    }

    /// Asks for a sync soon. Never blocks.
    pub fn request_sync(&self) {
        match self.requests.try_send(()) {
            Ok(()) => tracing::trace!("Sync requested"),
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::trace!("Sync already queued, coalescing request")
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::trace!("No scheduler running, dropping sync request")
            }
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}

pub struct SyncScheduler {
    handle: SyncHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawns the worker on the current runtime.
    ///
    /// If `job` reports pending work, a run is queued immediately.
    pub fn start(
        job: Arc<dyn SyncJob>,
        connectivity: Connectivity,
        settings: SchedulerSettings,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            job,
            requests: request_rx,
            status: status_tx,
            shutdown: shutdown_rx,
            connectivity,
            backoff: ExponentialBackoff::new(settings.min_backoff, settings.max_backoff),
            debounce: settings.debounce,
        };
        let task = tokio::spawn(worker.run());

        Self {
            handle: SyncHandle::new(request_tx, status_rx),
            shutdown: shutdown_tx,
            task,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stops the worker and waits for it. A run in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Sync worker ended abnormally");
        }
    }
}

struct Worker {
    job: Arc<dyn SyncJob>,
    requests: mpsc::Receiver<()>,
    status: watch::Sender<SyncStatus>,
    shutdown: watch::Receiver<bool>,
    connectivity: Connectivity,
    backoff: ExponentialBackoff,
    debounce: Duration,
}

impl Worker {
    async fn run(mut self) {
        let mut queued = self.job.has_pending().await;
        if queued {
            tracing::info!("Unsynced local changes found, resuming sync");
        }

        loop {
            if !queued && !self.next_request().await {
                break;
            }
            queued = false;

            if !self.sleep(self.debounce).await {
                break;
            }
            self.drain_requests();

            if !self.wait_for_network().await {
                break;
            }

            match self.run_job().await {
                SyncOutcome::Success | SyncOutcome::PermanentFailure => self.backoff.reset(),
                SyncOutcome::Retry => {
                    let delay = self.backoff.next_delay();
                    tracing::info!(delay_ms = delay.as_millis() as u64, "Sync will retry");
                    self.status.send_modify(|s| s.backoff = Some(delay));

                    let slept = self.sleep(delay).await;
                    self.status.send_modify(|s| s.backoff = None);
                    if !slept {
                        break;
                    }
                    // Requests made during the backoff ride along with the retry.
                    self.drain_requests();
                    queued = true;
                }
            }
        }

        tracing::debug!("Sync worker stopped");
    }

    /// Waits for a request. Returns false on shutdown.
    async fn next_request(&mut self) -> bool {
        tokio::select! {
            request = self.requests.recv() => request.is_some(),
            _ = self.shutdown.changed() => false,
        }
    }

    /// Sleeps unless shut down first. Returns false on shutdown.
    async fn sleep(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            let stopped = *self.shutdown.borrow();
            return !stopped;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.changed() => false,
        }
    }

    fn drain_requests(&mut self) {
        while self.requests.try_recv().is_ok() {}
    }

    async fn wait_for_network(&mut self) -> bool {
        let mut online = self.connectivity.subscribe();
        if *online.borrow_and_update() {
            return true;
        }

        tracing::info!("Waiting for network before syncing");
        self.status.send_modify(|s| s.waiting_for_network = true);

        let result = tokio::select! {
            ready = async { online.wait_for(|online| *online).await.is_ok() } => ready,
            _ = self.shutdown.changed() => false,
        };

        self.status.send_modify(|s| s.waiting_for_network = false);
        result
    }

    async fn run_job(&mut self) -> SyncOutcome {
        self.status.send_modify(|s| s.running = true);
        tracing::debug!("Sync run starting");

        let outcome = self.job.run().await;

        self.status.send_modify(|s| {
            s.running = false;
            s.runs += 1;
            s.last_outcome = Some(outcome);
            if outcome == SyncOutcome::Success {
                s.consecutive_failures = 0;
            } else {
                s.consecutive_failures += 1;
            }
        });

        match outcome {
            SyncOutcome::Success => tracing::debug!("Sync run succeeded"),
            SyncOutcome::Retry => tracing::warn!("Sync run failed, retry scheduled"),
            SyncOutcome::PermanentFailure => {
                tracing::error!("Sync run failed permanently, waiting for next change")
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted job: pops outcomes in order, defaulting to success.
    #[derive(Default)]
    struct ScriptedJob {
        runs: AtomicUsize,
        outcomes: Mutex<VecDeque<SyncOutcome>>,
        pending: AtomicBool,
        run_time: Duration,
    }

    impl ScriptedJob {
        fn with_outcomes(outcomes: &[SyncOutcome]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                ..Default::default()
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncJob for ScriptedJob {
        async fn run(&self) -> SyncOutcome {
            if !self.run_time.is_zero() {
                tokio::time::sleep(self.run_time).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SyncOutcome::Success)
        }

        async fn has_pending(&self) -> bool {
            self.pending.load(Ordering::SeqCst)
        }
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            debounce: Duration::from_millis(500),
            min_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(60),
        }
    }

    async fn advance(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_requests_runs_once() {
        let job = ScriptedJob::with_outcomes(&[]);
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());
        let handle = scheduler.handle();

        for _ in 0..10 {
            handle.request_sync();
        }
        advance(5.0).await;

        assert_eq!(job.runs(), 1);
        assert_eq!(handle.status().runs, 1);
        assert_eq!(handle.status().last_outcome, Some(SyncOutcome::Success));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_request_no_run() {
        let job = ScriptedJob::with_outcomes(&[]);
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());

        advance(60.0).await;

        assert_eq!(job.runs(), 0);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backs_off_exponentially_then_resets() {
        let job = ScriptedJob::with_outcomes(&[
            SyncOutcome::Retry,
            SyncOutcome::Retry,
            SyncOutcome::Success,
            SyncOutcome::Retry,
        ]);
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());
        let handle = scheduler.handle();

        // t=0.5 first run fails, waits 10s.
        handle.request_sync();
        advance(5.0).await;
        assert_eq!(job.runs(), 1);
        assert_eq!(handle.status().backoff, Some(Duration::from_secs(10)));
        assert_eq!(handle.status().consecutive_failures, 1);

        // t=11 second run fails, waits 20s.
        advance(10.0).await;
        assert_eq!(job.runs(), 2);
        assert_eq!(handle.status().backoff, Some(Duration::from_secs(20)));

        // Requests during backoff do not cut it short.
        handle.request_sync();
        advance(10.0).await;
        assert_eq!(job.runs(), 2);

        // t=31.5 third run succeeds.
        advance(10.0).await;
        assert_eq!(job.runs(), 3);
        let status = handle.status();
        assert_eq!(status.backoff, None);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_outcome, Some(SyncOutcome::Success));

        // Next failure starts from the minimum again.
        handle.request_sync();
        advance(5.0).await;
        assert_eq!(job.runs(), 4);
        assert_eq!(handle.status().backoff, Some(Duration::from_secs(10)));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_waits_for_next_request() {
        let job = ScriptedJob::with_outcomes(&[SyncOutcome::PermanentFailure]);
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());
        let handle = scheduler.handle();

        handle.request_sync();
        advance(120.0).await;
        assert_eq!(job.runs(), 1);
        assert_eq!(handle.status().backoff, None);
        assert_eq!(
            handle.status().last_outcome,
            Some(SyncOutcome::PermanentFailure)
        );

        handle.request_sync();
        advance(5.0).await;
        assert_eq!(job.runs(), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_network() {
        let job = ScriptedJob::with_outcomes(&[]);
        let connectivity = Connectivity::new(false);
        let scheduler = SyncScheduler::start(job.clone(), connectivity.clone(), settings());
        let handle = scheduler.handle();

        handle.request_sync();
        advance(60.0).await;
        assert_eq!(job.runs(), 0);
        assert!(handle.status().waiting_for_network);

        connectivity.set_online(true);
        advance(1.0).await;

        assert_eq!(job.runs(), 1);
        assert!(!handle.status().waiting_for_network);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_pending_work_on_start() {
        let job = Arc::new(ScriptedJob {
            pending: AtomicBool::new(true),
            ..Default::default()
        });
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());

        advance(5.0).await;

        assert_eq!(job.runs(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_run_causes_one_follow_up() {
        let job = Arc::new(ScriptedJob {
            run_time: Duration::from_secs(2),
            ..Default::default()
        });
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());
        let handle = scheduler.handle();

        // Run spans t=0.5..2.5.
        handle.request_sync();
        advance(1.0).await;
        assert!(handle.status().running);
        for _ in 0..3 {
            handle.request_sync();
        }
        advance(20.0).await;

        assert_eq!(job.runs(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_worker() {
        let job = ScriptedJob::with_outcomes(&[]);
        let scheduler = SyncScheduler::start(job.clone(), Connectivity::new(true), settings());
        let handle = scheduler.handle();

        scheduler.shutdown().await;
        handle.request_sync();
        advance(5.0).await;

        assert_eq!(job.runs(), 0);
    }

    #[test]
    fn test_detached_handle_drops_requests() {
        let handle = SyncHandle::detached();
        handle.request_sync();
        handle.request_sync();
        assert_eq!(handle.status(), SyncStatus::default());
    }

    #[test]
    fn test_settings_from_config() {
        let config = SyncConfig::default();
        let settings = SchedulerSettings::from(&config);
        assert_eq!(settings, SchedulerSettings::default());
    }
}
