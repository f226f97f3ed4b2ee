use std::sync::Arc;

use futures::Stream;

use super::synced::SyncedWriter;
use super::{LocalStore, StoreError};
use crate::models::day::day_start;
use crate::models::{
    new_id, now_millis, PersonalNote, PersonalNoteCategory, Table, DEFAULT_CATEGORIES,
};
use crate::remote::RemoteGateway;
use crate::sync::SyncHandle;

/// Personal note categories and the dated notes filed under them.
///
/// Categories and notes are independent rows: deleting a category leaves
/// its notes in place.
#[derive(Clone)]
pub struct PersonalNoteRepository {
    writer: SyncedWriter,
}

impl PersonalNoteRepository {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, sync: SyncHandle) -> Self {
        Self {
            writer: SyncedWriter::new(store, gateway, sync),
        }
    }

    fn store(&self) -> &LocalStore {
        &self.writer.store
    }

    pub fn observe_categories(
        &self,
    ) -> impl Stream<Item = Result<Vec<PersonalNoteCategory>, StoreError>> + Send + 'static {
        self.store()
            .observe(vec![Table::PersonalNoteCategories], |store| async move {
                list_categories(&store).await
            })
    }

    /// Notes in a category, newest date first.
    pub fn observe_notes_for_category(
        &self,
        category_id: &str,
    ) -> impl Stream<Item = Result<Vec<PersonalNote>, StoreError>> + Send + 'static {
        let category_id = category_id.to_string();
        self.store()
            .observe(vec![Table::PersonalNotes], move |store| {
                let category_id = category_id.clone();
                async move { notes_for_category(&store, &category_id).await }
            })
    }

    pub async fn list_categories(&self) -> Result<Vec<PersonalNoteCategory>, StoreError> {
        list_categories(self.store()).await
    }

    pub async fn list_notes_for_category(
        &self,
        category_id: &str,
    ) -> Result<Vec<PersonalNote>, StoreError> {
        notes_for_category(self.store(), category_id).await
    }

    pub async fn create_category(&self, name: &str) -> Result<PersonalNoteCategory, StoreError> {
        self.writer.insert(&PersonalNoteCategory::new(name)).await
    }

    pub async fn rename_category(
        &self,
        id: &str,
        name: &str,
    ) -> Result<PersonalNoteCategory, StoreError> {
        let mut category = self
            .store()
            .get::<PersonalNoteCategory>(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Table::PersonalNoteCategories, id))?;
        category.name = name.to_string();
        self.writer.insert(&category).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<bool, StoreError> {
        self.writer.delete::<PersonalNoteCategory>(id).await
    }

    /// Creates the default categories on a fresh install. Does nothing once
    /// any category exists, local or pulled.
    pub async fn seed_default_categories(&self) -> Result<Vec<PersonalNoteCategory>, StoreError> {
        if !self.list_categories().await?.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(DEFAULT_CATEGORIES.len());
        for name in DEFAULT_CATEGORIES {
            created.push(self.create_category(name).await?);
        }
        tracing::info!(count = created.len(), "Seeded default note categories");
        Ok(created)
    }

    pub async fn get_note(&self, id: &str) -> Result<Option<PersonalNote>, StoreError> {
        self.store().get(id).await
    }

    pub async fn create_note(
        &self,
        category_id: &str,
        title: &str,
        content: &str,
        date_ms: i64,
    ) -> Result<PersonalNote, StoreError> {
        self.writer
            .insert(&PersonalNote::new(category_id, title, content, date_ms))
            .await
    }

    /// Updates an existing note, or inserts it under a fresh id when its id
    /// is blank.
    pub async fn save_note(&self, note: &PersonalNote) -> Result<PersonalNote, StoreError> {
        let mut note = note.clone();
        note.date = day_start(note.date);

        if note.id.trim().is_empty() {
            note.id = new_id();
            note.created_at = now_millis();
            return self.writer.insert(&note).await;
        }
        self.writer.update(&note).await
    }

    pub async fn delete_note(&self, id: &str) -> Result<bool, StoreError> {
        self.writer.delete::<PersonalNote>(id).await
    }
}

async fn list_categories(store: &LocalStore) -> Result<Vec<PersonalNoteCategory>, StoreError> {
    let categories = sqlx::query_as::<_, PersonalNoteCategory>(
        "SELECT * FROM personal_note_categories ORDER BY created_at, name",
    )
    .fetch_all(store.pool())
    .await?;
    Ok(categories)
}

async fn notes_for_category(
    store: &LocalStore,
    category_id: &str,
) -> Result<Vec<PersonalNote>, StoreError> {
    let notes = sqlx::query_as::<_, PersonalNote>(
        "SELECT * FROM personal_notes WHERE category_id = ? ORDER BY date DESC, created_at DESC",
    )
    .bind(category_id)
    .fetch_all(store.pool())
    .await?;
    Ok(notes)
}
