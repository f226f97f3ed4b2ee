use serde::{Deserialize, Serialize};

use super::day::day_start;
use super::{new_id, now_millis, SqliteQuery, SyncRecord, Table};

/// Categories created when a fresh install has none.
pub const DEFAULT_CATEGORIES: [&str; 3] = ["CYP Talks", "CGS Talks", "Prophecies"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonalNoteCategory {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    #[serde(skip)]
    pub is_synced: bool,
}

impl PersonalNoteCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            created_at: now_millis(),
            is_synced: false,
        }
    }
}

impl SyncRecord for PersonalNoteCategory {
    const TABLE: Table = Table::PersonalNoteCategories;
    const COLUMNS: &'static [&'static str] = &["id", "name", "created_at"];

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
            .bind(&self.name)
            .bind(self.created_at)
    }
}

/// A dated note (talk summary, prophecy, ...) filed under a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonalNote {
    pub id: String,
    pub category_id: String,
    pub title: String,
    pub content: String,
    pub date: i64,
    pub created_at: i64,
    #[serde(skip)]
    pub is_synced: bool,
}

impl PersonalNote {
    /// Creates a note dated to the day containing `date_ms`.
    pub fn new(
        category_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        date_ms: i64,
    ) -> Self {
        Self {
            id: new_id(),
            category_id: category_id.into(),
            title: title.into(),
            content: content.into(),
            date: day_start(date_ms),
            created_at: now_millis(),
            is_synced: false,
        }
    }
}

impl SyncRecord for PersonalNote {
    const TABLE: Table = Table::PersonalNotes;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "category_id",
        "title",
        "content",
        "date",
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
            .bind(&self.category_id)
            .bind(&self.title)
            .bind(&self.content)
            .bind(self.date)
            .bind(self.created_at)
    }
}
