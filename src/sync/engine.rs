//! Push and pull between the local store and the remote gateway.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::{SyncJob, SyncOutcome};
use crate::db::{LocalStore, PullPolicy, RemoteApply, StoreError};
use crate::models::{
    DailyRecord, Note, PersonalNote, PersonalNoteCategory, SyncRecord, Table, Verse,
};
use crate::remote::{upsert_record, GatewayError, RemoteGateway};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] GatewayError),

    #[error("Local store error: {0}")]
    Local(#[from] StoreError),
}

/// Push result for one table.
#[derive(Debug)]
pub struct TablePush {
    pub table: Table,
    pub pushed: usize,
    /// Rows still dirty after the push.
    pub remaining: usize,
    pub error: Option<SyncError>,
}

impl TablePush {
    fn new(table: Table) -> Self {
        Self {
            table,
            pushed: 0,
            remaining: 0,
            error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PushReport {
    pub tables: Vec<TablePush>,
}

impl PushReport {
    pub fn pushed(&self) -> usize {
        self.tables.iter().map(|t| t.pushed).sum()
    }

    pub fn remaining(&self) -> usize {
        self.tables.iter().map(|t| t.remaining).sum()
    }

    pub fn table(&self, table: Table) -> Option<&TablePush> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Any remote failure means retry; a local-only failure will not fix
    /// itself by retrying.
    pub fn outcome(&self) -> SyncOutcome {
        let errors = || self.tables.iter().filter_map(|t| t.error.as_ref());
        if errors().any(|e| matches!(e, SyncError::Remote(_))) {
            SyncOutcome::Retry
        } else if errors().next().is_some() {
            SyncOutcome::PermanentFailure
        } else {
            SyncOutcome::Success
        }
    }
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.tables {
            write!(f, "{:<26} pushed {:>4}, remaining {:>4}", t.table, t.pushed, t.remaining)?;
            if let Some(e) = &t.error {
                write!(f, "  ({})", e)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Pull result for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePull {
    pub table: Table,
    pub applied: usize,
    pub skipped_dirty: usize,
    pub skipped_orphan: usize,
    /// Rows that could not be decoded.
    pub malformed: usize,
    pub error: Option<String>,
}

impl TablePull {
    fn new(table: Table) -> Self {
        Self {
            table,
            applied: 0,
            skipped_dirty: 0,
            skipped_orphan: 0,
            malformed: 0,
            error: None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub tables: Vec<TablePull>,
}

impl PullReport {
    pub fn applied(&self) -> usize {
        self.tables.iter().map(|t| t.applied).sum()
    }

    pub fn table(&self, table: Table) -> Option<&TablePull> {
        self.tables.iter().find(|t| t.table == table)
    }
}

impl fmt::Display for PullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.tables {
            write!(
                f,
                "{:<26} applied {:>4}, kept local {:>4}, orphaned {:>4}",
                t.table, t.applied, t.skipped_dirty, t.skipped_orphan
            )?;
            if t.malformed > 0 {
                write!(f, ", malformed {}", t.malformed)?;
            }
            if let Some(e) = &t.error {
                write!(f, "  ({})", e)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    pull_policy: PullPolicy,
}

impl SyncEngine {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, pull_policy: PullPolicy) -> Self {
        Self {
            store,
            gateway,
            pull_policy,
        }
    }

    /// Pushes every dirty row, table by table, parents before children.
    ///
    /// A failure stops its own table; rows already pushed stay clean and the
    /// remaining tables are still attempted.
    pub async fn push_all(&self) -> PushReport {
        let tables = vec![
            self.push_table::<Note>().await,
            self.push_table::<Verse>().await,
            self.push_table::<DailyRecord>().await,
            self.push_table::<PersonalNoteCategory>().await,
            self.push_table::<PersonalNote>().await,
        ];
        let report = PushReport { tables };
        tracing::info!(
            pushed = report.pushed(),
            remaining = report.remaining(),
            "Push finished"
        );
        report
    }

    async fn push_table<T: SyncRecord>(&self) -> TablePush {
        let mut report = TablePush::new(T::TABLE);

        let dirty = match self.store.dirty::<T>().await {
            Ok(dirty) => dirty,
            Err(e) => {
                tracing::error!(table = %T::TABLE, error = %e, "Failed to read dirty rows");
                report.error = Some(e.into());
                return report;
            }
        };
        report.remaining = dirty.len();

        for record in &dirty {
            if let Err(e) = upsert_record(self.gateway.as_ref(), record).await {
                tracing::warn!(table = %T::TABLE, id = record.id(), error = %e, "Push failed");
                report.error = Some(e.into());
                break;
            }
            report.pushed += 1;

            match self.store.mark_clean(record).await {
                Ok(true) => report.remaining -= 1,
                Ok(false) => {
                    tracing::debug!(table = %T::TABLE, id = record.id(), "Row changed during push")
                }
                Err(e) => {
                    tracing::error!(table = %T::TABLE, id = record.id(), error = %e, "Failed to mark row synced");
                    report.error = Some(e.into());
                    break;
                }
            }
        }

        report
    }

    /// Fetches every remote table and applies it under the pull policy.
    ///
    /// Remote failures are recorded per table and do not stop the pull.
    pub async fn pull_all(&self) -> Result<PullReport, StoreError> {
        let tables = vec![
            self.pull_table::<Note>().await?,
            self.pull_table::<Verse>().await?,
            self.pull_table::<DailyRecord>().await?,
            self.pull_table::<PersonalNoteCategory>().await?,
            self.pull_table::<PersonalNote>().await?,
        ];
        let report = PullReport { tables };
        tracing::info!(applied = report.applied(), "Pull finished");
        Ok(report)
    }

    async fn pull_table<T: SyncRecord>(&self) -> Result<TablePull, StoreError> {
        let mut report = TablePull::new(T::TABLE);

        let rows = match self.gateway.select_all(T::TABLE).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(table = %T::TABLE, error = %e, "Pull failed");
                report.error = Some(e.to_string());
                return Ok(report);
            }
        };

        for row in rows {
            let record: T = match serde_json::from_value(row) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(table = %T::TABLE, error = %e, "Skipping malformed remote row");
                    report.malformed += 1;
                    continue;
                }
            };

            match self.store.apply_remote(record, self.pull_policy).await? {
                RemoteApply::Applied => report.applied += 1,
                RemoteApply::SkippedDirty => report.skipped_dirty += 1,
                RemoteApply::SkippedOrphan => report.skipped_orphan += 1,
            }
        }

        if report.applied > 0 {
            self.store.notify(T::TABLE);
        }
        Ok(report)
    }
}

#[async_trait]
impl SyncJob for SyncEngine {
    async fn run(&self) -> SyncOutcome {
        self.push_all().await.outcome()
    }

    async fn has_pending(&self) -> bool {
        match self.store.count_all_dirty().await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::error!(error = %e, "Failed to count unsynced rows");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::remote::MemoryGateway;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        store: LocalStore,
        gateway: Arc<MemoryGateway>,
        engine: SyncEngine,
        _temp_dir: TempDir,
    }

    async fn setup_with(policy: PullPolicy) -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let store = LocalStore::new(pool);
        let gateway = Arc::new(MemoryGateway::new());
        let engine = SyncEngine::new(store.clone(), gateway.clone(), policy);
        TestContext {
            store,
            gateway,
            engine,
            _temp_dir: temp_dir,
        }
    }

    async fn setup() -> TestContext {
        setup_with(PullPolicy::PreserveDirty).await
    }

    fn note_at(theme: &str, created_at: i64) -> Note {
        let mut note = Note::new(theme);
        note.created_at = created_at;
        note
    }

    #[tokio::test]
    async fn test_push_marks_rows_clean_and_is_idempotent() {
        let ctx = setup().await;
        let note = ctx.store.save_dirty(&Note::new("Faith")).await.unwrap();
        ctx.store
            .save_dirty(&Verse::new(&note.id, "John 3:16", "For God so loved"))
            .await
            .unwrap();

        let report = ctx.engine.push_all().await;

        assert_eq!(report.pushed(), 2);
        assert_eq!(report.outcome(), SyncOutcome::Success);
        assert_eq!(ctx.store.count_all_dirty().await.unwrap(), 0);
        assert_eq!(ctx.gateway.rows(Table::Notes).len(), 1);
        assert_eq!(ctx.gateway.rows(Table::Verses).len(), 1);

        ctx.gateway.reset_calls();
        let report = ctx.engine.push_all().await;

        assert_eq!(report.pushed(), 0);
        assert!(ctx.gateway.upsert_calls().is_empty());
    }

    #[tokio::test]
    async fn test_push_pushes_parents_before_children() {
        let ctx = setup().await;
        // The verse is older than its note but must still go second.
        let note = note_at("Faith", 200);
        let mut verse = Verse::new(&note.id, "Heb 11:1", "Now faith is");
        verse.created_at = 100;
        ctx.store.save_dirty(&note).await.unwrap();
        ctx.store.save_dirty(&verse).await.unwrap();

        ctx.engine.push_all().await;

        let calls = ctx.gateway.upsert_calls();
        assert_eq!(calls[0].0, Table::Notes);
        assert_eq!(calls[1].0, Table::Verses);
    }

    #[tokio::test]
    async fn test_push_keeps_partial_progress() {
        let ctx = setup().await;
        let a = ctx.store.save_dirty(&note_at("A", 1)).await.unwrap();
        let b = ctx.store.save_dirty(&note_at("B", 2)).await.unwrap();
        let c = ctx.store.save_dirty(&note_at("C", 3)).await.unwrap();
        ctx.gateway.fail_upserts_for(&b.id);

        let report = ctx.engine.push_all().await;

        let notes = report.table(Table::Notes).unwrap();
        assert_eq!(notes.pushed, 1);
        assert_eq!(notes.remaining, 2);
        assert!(matches!(notes.error, Some(SyncError::Remote(_))));
        assert_eq!(report.outcome(), SyncOutcome::Retry);

        // C is never attempted once B fails.
        let attempted: Vec<String> = ctx
            .gateway
            .upsert_calls()
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert_eq!(attempted, vec![a.id.clone(), b.id.clone()]);

        let a_stored: Note = ctx.store.get(&a.id).await.unwrap().unwrap();
        let c_stored: Note = ctx.store.get(&c.id).await.unwrap().unwrap();
        assert!(a_stored.is_synced);
        assert!(!c_stored.is_synced);

        ctx.gateway.clear_failures();
        let report = ctx.engine.push_all().await;

        assert_eq!(report.pushed(), 2);
        assert_eq!(ctx.store.count_all_dirty().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_tables_are_independent() {
        let ctx = setup().await;
        let note = ctx.store.save_dirty(&Note::new("Faith")).await.unwrap();
        ctx.store
            .save_dirty(&DailyRecord::for_day(crate::models::now_millis()))
            .await
            .unwrap();
        ctx.gateway.fail_upserts_for(&note.id);

        let report = ctx.engine.push_all().await;

        assert_eq!(report.table(Table::DailyRecords).unwrap().pushed, 1);
        assert_eq!(ctx.store.count_dirty(Table::DailyRecords).await.unwrap(), 0);
        assert_eq!(ctx.store.count_dirty(Table::Notes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_push_offline_leaves_everything_dirty() {
        let ctx = setup().await;
        ctx.store.save_dirty(&Note::new("Faith")).await.unwrap();
        ctx.gateway.set_offline(true);

        let report = ctx.engine.push_all().await;

        assert_eq!(report.outcome(), SyncOutcome::Retry);
        assert_eq!(ctx.store.count_all_dirty().await.unwrap(), 1);
        assert!(ctx.engine.has_pending().await);
    }

    #[tokio::test]
    async fn test_pull_preserves_dirty_rows() {
        let ctx = setup().await;
        let mut local = Note::new("Local edit");
        local.id = "n1".to_string();
        ctx.store.save_dirty(&local).await.unwrap();
        ctx.gateway
            .seed(Table::Notes, json!({"id": "n1", "theme": "Remote", "created_at": 1}));
        ctx.gateway
            .seed(Table::Notes, json!({"id": "n2", "theme": "Other", "created_at": 2}));

        let report = ctx.engine.pull_all().await.unwrap();

        let notes = report.table(Table::Notes).unwrap();
        assert_eq!(notes.applied, 1);
        assert_eq!(notes.skipped_dirty, 1);

        let n1: Note = ctx.store.get("n1").await.unwrap().unwrap();
        assert_eq!(n1.theme, "Local edit");
        assert!(!n1.is_synced);
        let n2: Note = ctx.store.get("n2").await.unwrap().unwrap();
        assert_eq!(n2.theme, "Other");
        assert!(n2.is_synced);
    }

    #[tokio::test]
    async fn test_pull_remote_wins_overwrites_dirty_rows() {
        let ctx = setup_with(PullPolicy::RemoteWins).await;
        let mut local = Note::new("Local edit");
        local.id = "n1".to_string();
        ctx.store.save_dirty(&local).await.unwrap();
        ctx.gateway
            .seed(Table::Notes, json!({"id": "n1", "theme": "Remote", "created_at": 1}));

        ctx.engine.pull_all().await.unwrap();

        let n1: Note = ctx.store.get("n1").await.unwrap().unwrap();
        assert_eq!(n1.theme, "Remote");
        assert!(n1.is_synced);
    }

    #[tokio::test]
    async fn test_pull_skips_orphans_and_malformed_rows() {
        let ctx = setup().await;
        ctx.gateway.seed(
            Table::Verses,
            json!({"id": "v1", "note_id": "missing", "reference": "Ps 23:1", "content": "The Lord", "created_at": 1}),
        );
        ctx.gateway.seed(Table::Notes, json!({"id": "broken"}));

        let report = ctx.engine.pull_all().await.unwrap();

        assert_eq!(report.table(Table::Verses).unwrap().skipped_orphan, 1);
        assert_eq!(report.table(Table::Notes).unwrap().malformed, 1);
        assert!(ctx.store.all::<Verse>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pull_offline_records_errors() {
        let ctx = setup().await;
        ctx.gateway.set_offline(true);

        let report = ctx.engine.pull_all().await.unwrap();

        assert_eq!(report.tables.len(), Table::ALL.len());
        assert!(report.tables.iter().all(|t| t.error.is_some()));
    }

    #[tokio::test]
    async fn test_two_devices_converge_through_remote() {
        let device_a = setup().await;
        let device_b = setup().await;
        let shared: Arc<dyn RemoteGateway> = device_a.gateway.clone();
        let engine_b = SyncEngine::new(device_b.store.clone(), shared, PullPolicy::PreserveDirty);

        let note = device_a.store.save_dirty(&Note::new("Hope")).await.unwrap();
        device_a
            .store
            .save_dirty(&Verse::new(&note.id, "Rom 15:13", "May the God of hope"))
            .await
            .unwrap();
        device_a.engine.push_all().await;

        let report = engine_b.pull_all().await.unwrap();

        assert_eq!(report.applied(), 2);
        let notes: Vec<Note> = device_b.store.all().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].theme, "Hope");
        assert!(notes[0].is_synced);
        assert!(!engine_b.has_pending().await);
    }

    #[tokio::test]
    async fn test_run_maps_push_outcome() {
        let ctx = setup().await;
        assert_eq!(ctx.engine.run().await, SyncOutcome::Success);

        ctx.store.save_dirty(&Note::new("Faith")).await.unwrap();
        ctx.gateway.set_offline(true);
        assert_eq!(ctx.engine.run().await, SyncOutcome::Retry);
    }
}
