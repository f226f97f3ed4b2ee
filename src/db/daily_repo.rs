use std::sync::Arc;

use futures::Stream;

use super::synced::SyncedWriter;
use super::{LocalStore, StoreError};
use crate::models::day::day_start;
use crate::models::{DailyRecord, DailyRecordUpdate, Table};
use crate::remote::RemoteGateway;
use crate::sync::SyncHandle;

/// Daily reading and prayer records, at most one per local day.
#[derive(Clone)]
pub struct DailyRecordRepository {
    writer: SyncedWriter,
}

impl DailyRecordRepository {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, sync: SyncHandle) -> Self {
        Self {
            writer: SyncedWriter::new(store, gateway, sync),
        }
    }

    fn store(&self) -> &LocalStore {
        &self.writer.store
    }

    /// All records, newest day first.
    pub fn observe_all(
        &self,
    ) -> impl Stream<Item = Result<Vec<DailyRecord>, StoreError>> + Send + 'static {
        self.store()
            .observe(vec![Table::DailyRecords], |store| async move { list_all(&store).await })
    }

    pub fn observe_day(
        &self,
        timestamp_ms: i64,
    ) -> impl Stream<Item = Result<Option<DailyRecord>, StoreError>> + Send + 'static {
        let date = day_start(timestamp_ms);
        self.store()
            .observe(vec![Table::DailyRecords], move |store| async move {
                find_by_date(&store, date).await
            })
    }

    pub async fn list(&self) -> Result<Vec<DailyRecord>, StoreError> {
        list_all(self.store()).await
    }

    pub async fn get_for_day(&self, timestamp_ms: i64) -> Result<Option<DailyRecord>, StoreError> {
        find_by_date(self.store(), day_start(timestamp_ms)).await
    }

    /// Merges `update` onto the record for the day containing `timestamp_ms`,
    /// creating the record if the day has none yet.
    pub async fn record_day(
        &self,
        timestamp_ms: i64,
        update: DailyRecordUpdate,
    ) -> Result<DailyRecord, StoreError> {
        let existing = self
            .get_for_day(timestamp_ms)
            .await?
            .unwrap_or_else(|| DailyRecord::for_day(timestamp_ms));
        self.writer.insert(&update.apply_to(existing)).await
    }

    /// Rewrites an existing record. The date is normalised to its day, and
    /// moving onto a day held by another record fails with
    /// [`StoreError::DayTaken`].
    pub async fn update(&self, record: &DailyRecord) -> Result<DailyRecord, StoreError> {
        let mut record = record.clone();
        record.date = day_start(record.date);

        if let Some(existing) = find_by_date(self.store(), record.date).await? {
            if existing.id != record.id {
                return Err(StoreError::DayTaken {
                    date: record.date,
                    existing_id: existing.id,
                });
            }
        }
        self.writer.update(&record).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.writer.delete::<DailyRecord>(id).await
    }
}

async fn list_all(store: &LocalStore) -> Result<Vec<DailyRecord>, StoreError> {
    let records =
        sqlx::query_as::<_, DailyRecord>("SELECT * FROM daily_records ORDER BY date DESC")
            .fetch_all(store.pool())
            .await?;
    Ok(records)
}

async fn find_by_date(store: &LocalStore, date: i64) -> Result<Option<DailyRecord>, StoreError> {
    let record = sqlx::query_as::<_, DailyRecord>("SELECT * FROM daily_records WHERE date = ?")
        .bind(date)
        .fetch_optional(store.pool())
        .await?;
    Ok(record)
}
