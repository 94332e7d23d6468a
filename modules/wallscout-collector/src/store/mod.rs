// Document store contracts for notes.
//
// NoteStore: filtered find plus single-entity insert/delete/update; that is all
// the pipeline and pruning need from the document store client.
// DuplicateFinder: the three duplicate lookups the pipeline runs. Each one
//   excludes the candidate's own id. StoreDuplicateFinder derives them from any
//   NoteStore's find.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use wallscout_common::Note;

pub use memory::MemoryNoteStore;

/// Equality predicates over note fields, plus a not-equals-id and an age bound.
/// Unset fields do not constrain the match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    pub external_id: Option<String>,
    pub description_hash: Option<String>,
    pub contact_id: Option<String>,
    pub note_type: Option<i32>,
    pub exclude_id: Option<Uuid>,
    /// Match notes with `timestamp` strictly below this value.
    pub older_than: Option<i64>,
}

impl NoteFilter {
    pub fn matches(&self, note: &Note) -> bool {
        self.external_id
            .as_ref()
            .map_or(true, |v| *v == note.external_id)
            && self
                .description_hash
                .as_ref()
                .map_or(true, |v| *v == note.description_hash)
            && self.contact_id.as_ref().map_or(true, |v| *v == note.contact.id)
            && self.note_type.map_or(true, |v| v == note.note_type)
            && self.exclude_id.map_or(true, |v| v != note.id)
            && self.older_than.map_or(true, |v| note.timestamp < v)
    }
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Matching notes in storage order.
    async fn find(&self, filter: &NoteFilter) -> Result<Vec<Note>>;
    async fn insert(&self, note: &Note) -> Result<()>;
    /// Deleting a note that is already gone is not an error.
    async fn delete(&self, note: &Note) -> Result<()>;
    async fn update(&self, note: &Note) -> Result<()>;
}

#[async_trait]
pub trait DuplicateFinder: Send + Sync {
    /// Stored notes built from the same wall item.
    async fn find_external_id_duplicates(&self, note: &Note) -> Result<Vec<Note>>;

    /// Stored notes with the same description fingerprint.
    async fn find_description_duplicates(&self, note: &Note) -> Result<Vec<Note>>;

    /// Stored notes from the same contact with the same type.
    async fn find_contact_type_duplicates(&self, note: &Note) -> Result<Vec<Note>>;
}

/// [`DuplicateFinder`] expressed as [`NoteFilter`] queries against a [`NoteStore`].
pub struct StoreDuplicateFinder {
    store: Arc<dyn NoteStore>,
}

impl StoreDuplicateFinder {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DuplicateFinder for StoreDuplicateFinder {
    async fn find_external_id_duplicates(&self, note: &Note) -> Result<Vec<Note>> {
        self.store
            .find(&NoteFilter {
                external_id: Some(note.external_id.clone()),
                exclude_id: Some(note.id),
                ..Default::default()
            })
            .await
    }

    async fn find_description_duplicates(&self, note: &Note) -> Result<Vec<Note>> {
        self.store
            .find(&NoteFilter {
                description_hash: Some(note.description_hash.clone()),
                exclude_id: Some(note.id),
                ..Default::default()
            })
            .await
    }

    async fn find_contact_type_duplicates(&self, note: &Note) -> Result<Vec<Note>> {
        self.store
            .find(&NoteFilter {
                contact_id: Some(note.contact.id.clone()),
                note_type: Some(note.note_type),
                exclude_id: Some(note.id),
                ..Default::default()
            })
            .await
    }
}
