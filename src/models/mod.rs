mod daily_record;
pub mod day;
mod note;
mod personal_note;
mod table;

pub use daily_record::{DailyRecord, DailyRecordUpdate};
pub use note::{Note, NoteWithVerses, Verse};
pub use personal_note::{PersonalNote, PersonalNoteCategory, DEFAULT_CATEGORIES};
pub use table::Table;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};

/// A query with SQLite arguments still being bound.
pub type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A record carrying the sync envelope (`id`, `created_at`, `is_synced`).
///
/// The local store and the sync engine are written once against this trait;
/// each entity only describes its table and how its columns bind.
pub trait SyncRecord:
    Clone
    + Send
    + Sync
    + Unpin
    + Serialize
    + DeserializeOwned
    + for<'r> sqlx::FromRow<'r, SqliteRow>
    + 'static
{
    const TABLE: Table;

    /// Stored columns in bind order. Starts with `id`, ends with
    /// `created_at`, never includes `is_synced`.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;

    fn is_synced(&self) -> bool;

    fn set_synced(&mut self, synced: bool);

    /// Binds every column in [`SyncRecord::COLUMNS`] order.
    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    /// A second unique column holding an integer key, if the table has one.
    /// Writing a record replaces any other row that holds the same key.
    fn unique_key(&self) -> Option<(&'static str, i64)> {
        None
    }
}

/// Mints a client-side id. No round trip is needed to guarantee uniqueness.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
