//! Background synchronization between the local store and the remote.
//!
//! The [`SyncEngine`] does the actual push and pull. The [`SyncScheduler`]
//! decides when it runs: coalescing requests, waiting for [`Connectivity`]
//! and retrying with [`ExponentialBackoff`].

mod backoff;
mod connectivity;
mod engine;
mod scheduler;

pub use backoff::ExponentialBackoff;
pub use connectivity::Connectivity;
pub use engine::{PullReport, PushReport, SyncEngine, SyncError, TablePull, TablePush};
pub use scheduler::{
    SchedulerSettings, SyncHandle, SyncJob, SyncOutcome, SyncScheduler, SyncStatus,
};
