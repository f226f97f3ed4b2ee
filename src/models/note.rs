use serde::{Deserialize, Serialize};
use std::fmt;

use super::{new_id, now_millis, SqliteQuery, SyncRecord, Table};

/// A theme grouping a collection of verses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: String,
    pub theme: String,
    pub created_at: i64,
    #[serde(skip)]
    pub is_synced: bool,
}

impl Note {
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            theme: theme.into(),
            created_at: now_millis(),
            is_synced: false,
        }
    }
}

impl SyncRecord for Note {
    const TABLE: Table = Table::Notes;
    const COLUMNS: &'static [&'static str] = &["id", "theme", "created_at"];

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
            .bind(&self.theme)
            .bind(self.created_at)
    }
}

/// A single scripture passage filed under a [`Note`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Verse {
    pub id: String,
    pub note_id: String,
    pub reference: String,
    pub content: String,
    pub created_at: i64,
    #[serde(skip)]
    pub is_synced: bool,
}

impl Verse {
    pub fn new(
        note_id: impl Into<String>,
        reference: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            note_id: note_id.into(),
            reference: reference.into(),
            content: content.into(),
            created_at: now_millis(),
            is_synced: false,
        }
    }
}

impl SyncRecord for Verse {
    const TABLE: Table = Table::Verses;
    const COLUMNS: &'static [&'static str] =
        &["id", "note_id", "reference", "content", "created_at"];

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
            .bind(&self.note_id)
            .bind(&self.reference)
            .bind(&self.content)
            .bind(self.created_at)
    }
}

/// A note together with its verses, newest verse first.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteWithVerses {
    pub note: Note,
    pub verses: Vec<Verse>,
}

impl fmt::Display for NoteWithVerses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.note.theme)?;
        writeln!(f, "{}", "=".repeat(self.note.theme.chars().count().max(3)))?;
        for verse in &self.verses {
            writeln!(f, "  {}: {}", verse.reference, verse.content)?;
        }
        Ok(())
    }
}
