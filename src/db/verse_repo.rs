use std::collections::HashMap;
use std::sync::Arc;

use futures::Stream;

use super::synced::SyncedWriter;
use super::{LocalStore, StoreError};
use crate::models::{Note, NoteWithVerses, SyncRecord, Table, Verse};
use crate::remote::RemoteGateway;
use crate::sync::SyncHandle;

/// Themed notes and the verses filed under them.
#[derive(Clone)]
pub struct VerseRepository {
    writer: SyncedWriter,
}

impl VerseRepository {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, sync: SyncHandle) -> Self {
        Self {
            writer: SyncedWriter::new(store, gateway, sync),
        }
    }

    fn store(&self) -> &LocalStore {
        &self.writer.store
    }

    pub fn observe_notes_with_verses(
        &self,
    ) -> impl Stream<Item = Result<Vec<NoteWithVerses>, StoreError>> + Send + 'static {
        self.store()
            .observe(vec![Table::Notes, Table::Verses], |store| async move {
                load_notes_with_verses(&store).await
            })
    }

    pub fn observe_notes(
        &self,
    ) -> impl Stream<Item = Result<Vec<Note>, StoreError>> + Send + 'static {
        self.store()
            .observe(vec![Table::Notes], |store| async move { store.all::<Note>().await })
    }

    pub fn observe_verses_for_note(
        &self,
        note_id: &str,
    ) -> impl Stream<Item = Result<Vec<Verse>, StoreError>> + Send + 'static {
        let note_id = note_id.to_string();
        self.store().observe(vec![Table::Verses], move |store| {
            let note_id = note_id.clone();
            async move { verses_for_note(&store, &note_id).await }
        })
    }

    /// Notes newest first, each with its verses oldest first.
    pub async fn list_notes_with_verses(&self) -> Result<Vec<NoteWithVerses>, StoreError> {
        load_notes_with_verses(self.store()).await
    }

    pub async fn get_note(&self, id: &str) -> Result<Option<NoteWithVerses>, StoreError> {
        let Some(note) = self.store().get::<Note>(id).await? else {
            return Ok(None);
        };
        let verses = verses_for_note(self.store(), &note.id).await?;
        Ok(Some(NoteWithVerses { note, verses }))
    }

    pub async fn get_verse(&self, id: &str) -> Result<Option<Verse>, StoreError> {
        self.store().get(id).await
    }

    pub async fn create_note(&self, theme: &str) -> Result<Note, StoreError> {
        self.writer.insert(&Note::new(theme)).await
    }

    pub async fn update_note(&self, note: &Note) -> Result<Note, StoreError> {
        self.writer.update(note).await
    }

    /// Deletes the note and, locally, its verses. Only the note is deleted
    /// remotely.
    pub async fn delete_note(&self, id: &str) -> Result<bool, StoreError> {
        self.writer.delete::<Note>(id).await
    }

    pub async fn create_verse(
        &self,
        note_id: &str,
        reference: &str,
        content: &str,
    ) -> Result<Verse, StoreError> {
        if self.store().get::<Note>(note_id).await?.is_none() {
            return Err(StoreError::not_found(Table::Notes, note_id));
        }
        self.writer
            .insert(&Verse::new(note_id, reference, content))
            .await
    }

    pub async fn create_note_with_verse(
        &self,
        theme: &str,
        reference: &str,
        content: &str,
    ) -> Result<NoteWithVerses, StoreError> {
        let note = self.create_note(theme).await?;
        let verse = self.create_verse(&note.id, reference, content).await?;
        Ok(NoteWithVerses {
            note,
            verses: vec![verse],
        })
    }

    pub async fn update_verse(&self, verse: &Verse) -> Result<Verse, StoreError> {
        self.writer.update(verse).await
    }

    pub async fn delete_verse(&self, id: &str) -> Result<bool, StoreError> {
        self.writer.delete::<Verse>(id).await
    }
}

async fn verses_for_note(store: &LocalStore, note_id: &str) -> Result<Vec<Verse>, StoreError> {
    let verses = sqlx::query_as::<_, Verse>(
        "SELECT * FROM verses WHERE note_id = ? ORDER BY created_at, id",
    )
    .bind(note_id)
    .fetch_all(store.pool())
    .await?;
    Ok(verses)
}

async fn load_notes_with_verses(store: &LocalStore) -> Result<Vec<NoteWithVerses>, StoreError> {
    let notes = store.all::<Note>().await?;
    let verses = sqlx::query_as::<_, Verse>("SELECT * FROM verses ORDER BY created_at, id")
        .fetch_all(store.pool())
        .await?;

    let mut by_note: HashMap<String, Vec<Verse>> = HashMap::new();
    for verse in verses {
        by_note.entry(verse.note_id.clone()).or_default().push(verse);
    }

    Ok(notes
        .into_iter()
        .map(|note| {
            let verses = by_note.remove(note.id()).unwrap_or_default();
            NoteWithVerses { note, verses }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::remote::MemoryGateway;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{mpsc, watch};

    struct TestContext {
        repo: VerseRepository,
        store: LocalStore,
        gateway: Arc<MemoryGateway>,
        requests: mpsc::Receiver<()>,
        _temp_dir: TempDir,
    }

    impl TestContext {
        fn sync_requested(&mut self) -> bool {
            let mut requested = false;
            while self.requests.try_recv().is_ok() {
                requested = true;
            }
            requested
        }
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let store = LocalStore::new(pool);
        let gateway = Arc::new(MemoryGateway::new());
        let (request_tx, requests) = mpsc::channel(1);
        let (_, status) = watch::channel(Default::default());
        let repo = VerseRepository::new(
            store.clone(),
            gateway.clone(),
            SyncHandle::new(request_tx, status),
        );
        TestContext {
            repo,
            store,
            gateway,
            requests,
            _temp_dir: temp_dir,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_create_note_is_dirty_and_requests_sync() {
        let mut ctx = setup_repo().await;

        let note = ctx.repo.create_note("Faith").await.unwrap();

        assert!(!note.is_synced);
        assert!(ctx.sync_requested());
        assert_eq!(ctx.store.count_dirty(Table::Notes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_note_with_verse() {
        let ctx = setup_repo().await;

        let created = ctx
            .repo
            .create_note_with_verse("Love", "1 Cor 13:4", "Love is patient")
            .await
            .unwrap();

        let fetched = ctx.repo.get_note(&created.note.id).await.unwrap().unwrap();
        assert_eq!(fetched.note.theme, "Love");
        assert_eq!(fetched.verses.len(), 1);
        assert_eq!(fetched.verses[0].reference, "1 Cor 13:4");
    }

    #[tokio::test]
    async fn test_create_verse_for_missing_note() {
        let ctx = setup_repo().await;

        let result = ctx.repo.create_verse("missing", "Ps 1:1", "Blessed").await;

        assert!(matches!(result, Err(StoreError::NotFound { table: Table::Notes, .. })));
    }

    #[tokio::test]
    async fn test_list_notes_groups_verses() {
        let ctx = setup_repo().await;
        let faith = ctx.repo.create_note("Faith").await.unwrap();
        let hope = ctx.repo.create_note("Hope").await.unwrap();
        ctx.repo.create_verse(&faith.id, "Heb 11:1", "a").await.unwrap();
        ctx.repo.create_verse(&faith.id, "Heb 11:6", "b").await.unwrap();
        ctx.repo.create_verse(&hope.id, "Rom 5:5", "c").await.unwrap();

        let notes = ctx.repo.list_notes_with_verses().await.unwrap();

        assert_eq!(notes.len(), 2);
        let faith_entry = notes.iter().find(|n| n.note.id == faith.id).unwrap();
        assert_eq!(faith_entry.verses.len(), 2);
        assert_eq!(faith_entry.verses[0].reference, "Heb 11:1");
        let hope_entry = notes.iter().find(|n| n.note.id == hope.id).unwrap();
        assert_eq!(hope_entry.verses.len(), 1);
    }

    #[tokio::test]
    async fn test_update_note() {
        let mut ctx = setup_repo().await;
        let mut note = ctx.repo.create_note("Faith").await.unwrap();
        ctx.store.mark_clean(&note).await.unwrap();
        ctx.sync_requested();

        note.theme = "Faithfulness".to_string();
        let updated = ctx.repo.update_note(&note).await.unwrap();

        assert_eq!(updated.theme, "Faithfulness");
        assert!(ctx.sync_requested());
        let stored: Note = ctx.store.get(&note.id).await.unwrap().unwrap();
        assert!(!stored.is_synced);
    }

    #[tokio::test]
    async fn test_update_missing_note_fails() {
        let ctx = setup_repo().await;

        let result = ctx.repo.update_note(&Note::new("Ghost")).await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_note_cascades_locally_and_deletes_note_remotely() {
        let ctx = setup_repo().await;
        let created = ctx
            .repo
            .create_note_with_verse("Peace", "John 14:27", "Peace I leave")
            .await
            .unwrap();
        let verse_id = created.verses[0].id.clone();

        assert!(ctx.repo.delete_note(&created.note.id).await.unwrap());
        settle().await;

        assert!(ctx.repo.get_note(&created.note.id).await.unwrap().is_none());
        assert!(ctx.repo.get_verse(&verse_id).await.unwrap().is_none());
        assert_eq!(
            ctx.gateway.delete_calls(),
            vec![(Table::Notes, created.note.id.clone())]
        );
    }

    #[tokio::test]
    async fn test_delete_missing_note_skips_remote() {
        let ctx = setup_repo().await;

        assert!(!ctx.repo.delete_note("missing").await.unwrap());
        settle().await;

        assert!(ctx.gateway.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_verse() {
        let ctx = setup_repo().await;
        let created = ctx
            .repo
            .create_note_with_verse("Joy", "Neh 8:10", "The joy of the Lord")
            .await
            .unwrap();

        ctx.repo.delete_verse(&created.verses[0].id).await.unwrap();

        let note = ctx.repo.get_note(&created.note.id).await.unwrap().unwrap();
        assert!(note.verses.is_empty());
    }

    #[tokio::test]
    async fn test_observe_notes_with_verses_follows_writes() {
        let ctx = setup_repo().await;
        let mut stream = Box::pin(ctx.repo.observe_notes_with_verses());

        let initial = stream.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        let note = ctx.repo.create_note("Grace").await.unwrap();
        let after_note = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(after_note.len(), 1);

        ctx.repo.create_verse(&note.id, "Eph 2:8", "By grace").await.unwrap();
        let after_verse = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(after_verse[0].verses.len(), 1);
    }

    #[tokio::test]
    async fn test_observe_verses_for_note() {
        let ctx = setup_repo().await;
        let note = ctx.repo.create_note("Wisdom").await.unwrap();
        let mut stream = Box::pin(ctx.repo.observe_verses_for_note(&note.id));

        assert!(stream.next().await.unwrap().unwrap().is_empty());

        ctx.repo.create_verse(&note.id, "Prov 3:5", "Trust").await.unwrap();
        let verses = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(verses.len(), 1);
    }
}
