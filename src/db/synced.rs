use std::sync::Arc;

use super::{LocalStore, StoreError};
use crate::models::SyncRecord;
use crate::remote::{spawn_remote_delete, RemoteGateway};
use crate::sync::SyncHandle;

/// The write path shared by every repository.
///
/// Inserts and updates land locally as dirty and then request a sync.
/// Deletes are local first, then sent to the remote once without retry.
#[derive(Clone)]
pub(crate) struct SyncedWriter {
    pub(crate) store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    sync: SyncHandle,
}

impl SyncedWriter {
    pub(crate) fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, sync: SyncHandle) -> Self {
        Self {
            store,
            gateway,
            sync,
        }
    }

    pub(crate) async fn insert<T: SyncRecord>(&self, record: &T) -> Result<T, StoreError> {
        let saved = self.store.save_dirty(record).await?;
        self.sync.request_sync();
        Ok(saved)
    }

    /// Like [`SyncedWriter::insert`], but the row must already exist.
    pub(crate) async fn update<T: SyncRecord>(&self, record: &T) -> Result<T, StoreError> {
        if self.store.get::<T>(record.id()).await?.is_none() {
            return Err(StoreError::not_found(T::TABLE, record.id()));
        }
        self.insert(record).await
    }

    pub(crate) async fn delete<T: SyncRecord>(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.store.delete::<T>(id).await?;
        if deleted {
            spawn_remote_delete(self.gateway.clone(), T::TABLE, id.to_string());
        }
        Ok(deleted)
    }
}
