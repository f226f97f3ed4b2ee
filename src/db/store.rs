//! The local store: durable SQLite tables plus change notification.
//!
//! Every entity table shares the sync envelope, so the operations here are
//! written once over [`SyncRecord`]. Each committed write publishes the
//! affected [`Table`] on a broadcast channel, which is what drives
//! [`LocalStore::observe`].

use std::future::Future;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::StoreError;
use crate::models::{SyncRecord, Table};

const CHANGE_CAPACITY: usize = 256;

/// How a pull treats local rows that have not been pushed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    /// Leave dirty local rows alone; they win until pushed.
    #[default]
    PreserveDirty,
    /// Overwrite whatever the remote sends, dirty or not.
    RemoteWins,
}

/// What happened to a single remote row during a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    Applied,
    SkippedDirty,
    /// The row references a parent that does not exist locally.
    SkippedOrphan,
}

#[derive(Clone, Debug)]
pub struct LocalStore {
    pool: SqlitePool,
    changes: broadcast::Sender<Table>,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { pool, changes }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Publishes a committed change to observers.
    pub(crate) fn notify(&self, table: Table) {
        // No receivers just means nobody is observing.
        let _ = self.changes.send(table);
    }

    /// Opens a transaction holding the write lock from its first statement.
    ///
    /// A deferred transaction that reads before writing cannot upgrade its
    /// lock once another connection has committed, and fails with
    /// `SQLITE_BUSY` without waiting on the busy timeout.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Upserts `record` as dirty and returns the stored copy.
    pub async fn save_dirty<T: SyncRecord>(&self, record: &T) -> Result<T, StoreError> {
        let mut record = record.clone();
        record.set_synced(false);

        let mut tx = self.begin_write().await?;
        write_record(&mut tx, &record).await?;
        tx.commit().await?;

        self.notify(T::TABLE);
        Ok(record)
    }

    pub async fn get<T: SyncRecord>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", T::TABLE);
        let record = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// All rows, newest first.
    pub async fn all<T: SyncRecord>(&self) -> Result<Vec<T>, StoreError> {
        let sql = format!("SELECT * FROM {} ORDER BY created_at DESC, id", T::TABLE);
        let records = sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?;
        Ok(records)
    }

    /// The push set: rows not yet confirmed at the remote, oldest first.
    pub async fn dirty<T: SyncRecord>(&self) -> Result<Vec<T>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_synced = 0 ORDER BY created_at, id",
            T::TABLE
        );
        let records = sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?;
        Ok(records)
    }

    pub async fn count_dirty(&self, table: Table) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE is_synced = 0", table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn count_all_dirty(&self) -> Result<i64, StoreError> {
        let mut total = 0;
        for table in Table::ALL {
            total += self.count_dirty(table).await?;
        }
        Ok(total)
    }

    /// Marks a pushed record clean, but only if the stored row still equals
    /// the copy that was pushed. Returns false when the row was edited or
    /// deleted in the meantime, leaving it for the next push.
    ///
    /// This is not a local mutation: it never requests a sync.
    pub async fn mark_clean<T: SyncRecord>(&self, pushed: &T) -> Result<bool, StoreError> {
        let conditions = T::COLUMNS
            .iter()
            .map(|column| format!("{} IS ?", column))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "UPDATE {} SET is_synced = 1 WHERE is_synced = 0 AND {}",
            T::TABLE,
            conditions
        );

        let result = pushed
            .bind_columns(sqlx::query(&sql))
            .execute(&self.pool)
            .await?;

        let cleaned = result.rows_affected() > 0;
        if cleaned {
            self.notify(T::TABLE);
        }
        Ok(cleaned)
    }

    /// Writes a row fetched from the remote as synced.
    ///
    /// Does not notify; the caller publishes once per pulled table.
    pub async fn apply_remote<T: SyncRecord>(
        &self,
        mut record: T,
        policy: PullPolicy,
    ) -> Result<RemoteApply, StoreError> {
        let mut tx = self.begin_write().await?;

        if policy == PullPolicy::PreserveDirty && holds_dirty(&mut tx, &record).await? {
            return Ok(RemoteApply::SkippedDirty);
        }

        record.set_synced(true);
        if let Err(e) = write_record(&mut tx, &record).await {
            let err = StoreError::from(e);
            if err.is_foreign_key_violation() {
                return Ok(RemoteApply::SkippedOrphan);
            }
            return Err(err);
        }

        tx.commit().await?;
        Ok(RemoteApply::Applied)
    }

    /// Deletes a row locally. Child tables cascade.
    pub async fn delete<T: SyncRecord>(&self, id: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", T::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(T::TABLE);
            for child in T::TABLE.cascades_to() {
                self.notify(*child);
            }
        }
        Ok(deleted)
    }

    /// Streams `query`'s result now and again after every committed write to
    /// any of `tables`. Bursts of writes collapse into one re-evaluation.
    pub fn observe<R, F, Fut>(
        &self,
        tables: Vec<Table>,
        query: F,
    ) -> impl Stream<Item = Result<R, StoreError>> + Send + 'static
    where
        R: Send + 'static,
        F: Fn(LocalStore) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, StoreError>> + Send + 'static,
    {
        let state = Observer {
            store: self.clone(),
            changes: self.changes.subscribe(),
            tables,
            query,
            primed: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.primed && !state.wait_for_change().await {
                return None;
            }
            state.primed = true;
            let result = (state.query)(state.store.clone()).await;
            Some((result, state))
        })
    }
}

struct Observer<F> {
    store: LocalStore,
    changes: broadcast::Receiver<Table>,
    tables: Vec<Table>,
    query: F,
    primed: bool,
}

impl<F> Observer<F> {
    async fn wait_for_change(&mut self) -> bool {
        loop {
            match self.changes.recv().await {
                Ok(table) if self.tables.contains(&table) => break,
                Ok(_) => continue,
                // Missed some notifications; re-query to be safe.
                Err(RecvError::Lagged(_)) => break,
                Err(RecvError::Closed) => return false,
            }
        }

        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => return false,
            }
        }
    }
}

fn upsert_sql<T: SyncRecord>() -> String {
    let columns = T::COLUMNS.join(", ");
    let placeholders = vec!["?"; T::COLUMNS.len() + 1].join(", ");
    // created_at is immutable once a row exists.
    let updates = T::COLUMNS
        .iter()
        .filter(|column| !matches!(**column, "id" | "created_at"))
        .map(|column| format!("{0} = excluded.{0}", column))
        .chain(std::iter::once("is_synced = excluded.is_synced".to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}, is_synced) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        T::TABLE,
        columns,
        placeholders,
        updates
    )
}

async fn write_record<T: SyncRecord>(
    conn: &mut SqliteConnection,
    record: &T,
) -> Result<(), sqlx::Error> {
    if let Some((column, key)) = record.unique_key() {
        let sql = format!("DELETE FROM {} WHERE {} = ? AND id <> ?", T::TABLE, column);
        sqlx::query(&sql)
            .bind(key)
            .bind(record.id())
            .execute(&mut *conn)
            .await?;
    }

    let sql = upsert_sql::<T>();
    record
        .bind_columns(sqlx::query(&sql))
        .bind(record.is_synced())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn holds_dirty<T: SyncRecord>(
    conn: &mut SqliteConnection,
    record: &T,
) -> Result<bool, sqlx::Error> {
    let dirty = match record.unique_key() {
        Some((column, key)) => {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE is_synced = 0 AND (id = ? OR {} = ?))",
                T::TABLE,
                column
            );
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(record.id())
                .bind(key)
                .fetch_one(&mut *conn)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE is_synced = 0 AND id = ?)",
                T::TABLE
            );
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(record.id())
                .fetch_one(&mut *conn)
                .await?
        }
    };
    Ok(dirty)
}
