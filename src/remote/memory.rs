//! In-memory gateway with failure injection.
//!
//! Stands in for the remote when none is configured, and lets tests script
//! outages and per-record rejections.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{GatewayError, RemoteGateway};
use crate::models::Table;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<Table, BTreeMap<String, Value>>,
    offline: bool,
    failing_ids: HashSet<String>,
    upserts: Vec<(Table, String)>,
    selects: Vec<Table>,
    deletes: Vec<(Table, String)>,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that fails every call, used when no remote is configured.
    pub fn offline() -> Self {
        let gateway = Self::default();
        gateway.set_offline(true);
        gateway
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Rejects every upsert of `id` until [`MemoryGateway::clear_failures`].
    pub fn fail_upserts_for(&self, id: impl Into<String>) {
        self.state().failing_ids.insert(id.into());
    }

    pub fn clear_failures(&self) {
        self.state().failing_ids.clear();
    }

    /// Places a row directly in a remote table.
    pub fn seed(&self, table: Table, row: Value) {
        if let Some(id) = row.get("id").and_then(Value::as_str) {
            let id = id.to_string();
            self.state().tables.entry(table).or_default().insert(id, row);
        }
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.state()
            .tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: Table, id: &str) -> Option<Value> {
        self.state()
            .tables
            .get(&table)
            .and_then(|rows| rows.get(id).cloned())
    }

    /// Every attempted upsert in call order, including failed ones.
    pub fn upsert_calls(&self) -> Vec<(Table, String)> {
        self.state().upserts.clone()
    }

    pub fn select_calls(&self) -> Vec<Table> {
        self.state().selects.clone()
    }

    pub fn delete_calls(&self) -> Vec<(Table, String)> {
        self.state().deletes.clone()
    }

    pub fn reset_calls(&self) {
        let mut state = self.state();
        state.upserts.clear();
        state.selects.clear();
        state.deletes.clear();
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn upsert(&self, table: Table, record: Value) -> Result<(), GatewayError> {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Payload("record has no string id".to_string()))?
            .to_string();

        let mut state = self.state();
        state.upserts.push((table, id.clone()));

        if state.offline {
            return Err(GatewayError::Offline);
        }
        if state.failing_ids.contains(&id) {
            return Err(GatewayError::Status {
                status: 503,
                body: format!("rejected {}", id),
            });
        }

        state.tables.entry(table).or_default().insert(id, record);
        Ok(())
    }

    async fn select_all(&self, table: Table) -> Result<Vec<Value>, GatewayError> {
        let mut state = self.state();
        state.selects.push(table);

        if state.offline {
            return Err(GatewayError::Offline);
        }
        Ok(state
            .tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_by_id(&self, table: Table, id: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.deletes.push((table, id.to_string()));

        if state.offline {
            return Err(GatewayError::Offline);
        }
        if let Some(rows) = state.tables.get_mut(&table) {
            rows.remove(id);
        }
        Ok(())
    }
}
