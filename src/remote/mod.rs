//! Remote gateway: the narrow client over the remote table API.
//!
//! Each call is exactly one network round trip. Looping, batching and retry
//! belong to the sync engine, never to a gateway.

mod memory;
mod postgrest;

pub use memory::MemoryGateway;
pub use postgrest::PostgrestGateway;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::models::{SyncRecord, Table};

/// Errors from a single remote call.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Remote not configured. Add remote.url and remote.api_key to config.")]
    NotConfigured,

    #[error("Remote unreachable: {0}")]
    Transport(String),

    #[error("Remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Remote is offline")]
    Offline,
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Payload(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Object CRUD against the fixed set of remote tables.
///
/// Records travel as JSON objects whose field names match the local columns,
/// minus `is_synced`.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Inserts or replaces the record with the same `id`.
    async fn upsert(&self, table: Table, record: Value) -> Result<(), GatewayError>;

    /// Fetches the entire table.
    async fn select_all(&self, table: Table) -> Result<Vec<Value>, GatewayError>;

    async fn delete_by_id(&self, table: Table, id: &str) -> Result<(), GatewayError>;
}

/// Encodes and upserts one typed record.
pub async fn upsert_record<T: SyncRecord>(
    gateway: &dyn RemoteGateway,
    record: &T,
) -> Result<(), GatewayError> {
    let value = serde_json::to_value(record).map_err(|e| GatewayError::Payload(e.to_string()))?;
    gateway.upsert(T::TABLE, value).await
}

/// Fires a remote delete without waiting for it.
///
/// Failures are logged and dropped. Nothing retries a delete, so a failure
/// here leaves the row orphaned at the remote.
pub fn spawn_remote_delete(
    gateway: Arc<dyn RemoteGateway>,
    table: Table,
    id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match gateway.delete_by_id(table, &id).await {
            Ok(()) => tracing::debug!(%table, %id, "Remote delete succeeded"),
            Err(e) => {
                tracing::warn!(%table, %id, error = %e, "Remote delete failed, leaving remote orphan")
            }
        }
    })
}
