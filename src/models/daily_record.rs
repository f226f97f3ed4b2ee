use serde::{Deserialize, Serialize};
use std::fmt;

use super::day::day_start;
use super::{new_id, now_millis, SqliteQuery, SyncRecord, Table};

/// One day of reading and prayer, keyed by the day's local midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyRecord {
    pub id: String,
    pub date: i64,
    #[serde(default)]
    pub read_today: bool,
    #[serde(default)]
    pub what_read: String,
    #[serde(default)]
    pub total_read_time_minutes: i32,
    #[serde(default)]
    pub prayed_today: bool,
    #[serde(default)]
    pub total_prayer_time_minutes: i32,
    #[serde(default)]
    pub prophecy: String,
    pub created_at: i64,
    #[serde(skip)]
    pub is_synced: bool,
}

impl DailyRecord {
    /// Creates an empty record for the day containing `timestamp_ms`.
    pub fn for_day(timestamp_ms: i64) -> Self {
        Self {
            id: new_id(),
            date: day_start(timestamp_ms),
            read_today: false,
            what_read: String::new(),
            total_read_time_minutes: 0,
            prayed_today: false,
            total_prayer_time_minutes: 0,
            prophecy: String::new(),
            created_at: now_millis(),
            is_synced: false,
        }
    }
}

impl SyncRecord for DailyRecord {
    const TABLE: Table = Table::DailyRecords;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "date",
        "read_today",
        "what_read",
        "total_read_time_minutes",
        "prayed_today",
        "total_prayer_time_minutes",
        "prophecy",
        "created_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn is_synced(&self) -> bool {
        self.is_synced
    }

    fn set_synced(&mut self, synced: bool) {
        self.is_synced = synced;
    }

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.id)
            .bind(self.date)
            .bind(self.read_today)
            .bind(&self.what_read)
            .bind(self.total_read_time_minutes)
            .bind(self.prayed_today)
            .bind(self.total_prayer_time_minutes)
            .bind(&self.prophecy)
            .bind(self.created_at)
    }

    fn unique_key(&self) -> Option<(&'static str, i64)> {
        Some(("date", self.date))
    }
}

impl fmt::Display for DailyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |done: bool| if done { "x" } else { " " };
        writeln!(
            f,
            "[{}] read {} min  {}",
            mark(self.read_today),
            self.total_read_time_minutes,
            self.what_read
        )?;
        writeln!(
            f,
            "[{}] prayed {} min",
            mark(self.prayed_today),
            self.total_prayer_time_minutes
        )?;
        if !self.prophecy.is_empty() {
            writeln!(f, "Prophecy: {}", self.prophecy)?;
        }
        Ok(())
    }
}

/// A partial edit of a day's record. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyRecordUpdate {
    pub read_today: Option<bool>,
    pub what_read: Option<String>,
    pub total_read_time_minutes: Option<i32>,
    pub prayed_today: Option<bool>,
    pub total_prayer_time_minutes: Option<i32>,
    pub prophecy: Option<String>,
}

impl DailyRecordUpdate {
    pub fn read(mut self, what: impl Into<String>, minutes: i32) -> Self {
        self.read_today = Some(true);
        self.what_read = Some(what.into());
        self.total_read_time_minutes = Some(minutes);
        self
    }

    pub fn prayed(mut self, minutes: i32) -> Self {
        self.prayed_today = Some(true);
        self.total_prayer_time_minutes = Some(minutes);
        self
    }

    pub fn with_prophecy(mut self, prophecy: impl Into<String>) -> Self {
        self.prophecy = Some(prophecy.into());
        self
    }

    /// Applies the set fields onto `record` and marks it dirty.
    pub fn apply_to(self, mut record: DailyRecord) -> DailyRecord {
        if let Some(v) = self.read_today {
            record.read_today = v;
        }
        if let Some(v) = self.what_read {
            record.what_read = v;
        }
        if let Some(v) = self.total_read_time_minutes {
            record.total_read_time_minutes = v;
        }
        if let Some(v) = self.prayed_today {
            record.prayed_today = v;
        }
        if let Some(v) = self.total_prayer_time_minutes {
            record.total_prayer_time_minutes = v;
        }
        if let Some(v) = self.prophecy {
            record.prophecy = v;
        }
        record.is_synced = false;
        record
    }
}
