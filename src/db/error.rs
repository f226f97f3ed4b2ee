use std::path::PathBuf;

use crate::models::Table;

/// Errors from the local store.
///
/// These indicate a local fault and are always propagated to the caller,
/// unlike remote failures which the sync engine absorbs.
#[derive(Debug)]
pub enum StoreError {
    /// Query or connection failure
    Database(sqlx::Error),
    /// Schema migration failed
    Migration(sqlx::migrate::MigrateError),
    /// Could not create the database directory
    Io(PathBuf, std::io::Error),
    /// A record expected to exist is missing
    NotFound { table: Table, id: String },
    /// Another daily record already holds this day
    DayTaken { date: i64, existing_id: String },
}

impl StoreError {
    pub fn not_found(table: Table, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            table,
            id: id.into(),
        }
    }

    /// True when the write referenced a parent row that does not exist.
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(sqlx::Error::Database(e))
                if e.kind() == sqlx::error::ErrorKind::ForeignKeyViolation
        )
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Migration(e) => write!(f, "Migration error: {}", e),
            StoreError::Io(path, e) => {
                write!(
                    f,
                    "Failed to create database directory '{}': {}",
                    path.display(),
                    e
                )
            }
            StoreError::NotFound { table, id } => write!(f, "Not found in {}: {}", table, id),
            StoreError::DayTaken { date, existing_id } => {
                write!(f, "Day {} already has record {}", date, existing_id)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Migration(e) => Some(e),
            StoreError::Io(_, e) => Some(e),
            StoreError::NotFound { .. } | StoreError::DayTaken { .. } => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e)
    }
}
