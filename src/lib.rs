//! VerseTrack
//!
//! Offline-first storage for scripture notes, daily devotion records and
//! personal notes. Every write lands in a local SQLite store first and is
//! pushed to the remote table API in the background.

pub mod app;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod remote;
pub mod sync;

pub use app::{AppContext, AppError};
pub use config::Config;
pub use db::{
    DailyRecordRepository, LocalStore, PersonalNoteRepository, StoreError, VerseRepository,
};
pub use models::{
    DailyRecord, DailyRecordUpdate, Note, NoteWithVerses, PersonalNote, PersonalNoteCategory,
    Table, Verse,
};
pub use remote::{GatewayError, MemoryGateway, PostgrestGateway, RemoteGateway};
pub use sync::{Connectivity, SyncEngine, SyncHandle, SyncOutcome, SyncScheduler, SyncStatus};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
