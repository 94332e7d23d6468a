use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use wallscout_common::Note;

use super::{NoteFilter, NoteStore};

/// In-memory note collection. Keeps insertion order; ids are unique.
#[derive(Default)]
pub struct MemoryNoteStore {
    notes: Mutex<Vec<Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self {
            notes: Mutex::new(notes),
        }
    }

    /// Snapshot of everything stored.
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().map(|n| n.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn find(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let notes = self.notes.lock().map_err(|_| anyhow!("note store lock poisoned"))?;
        Ok(notes.iter().filter(|n| filter.matches(n)).cloned().collect())
    }

    async fn insert(&self, note: &Note) -> Result<()> {
        let mut notes = self.notes.lock().map_err(|_| anyhow!("note store lock poisoned"))?;
        if notes.iter().any(|n| n.id == note.id) {
            bail!("note {} already exists", note.id);
        }
        notes.push(note.clone());
        Ok(())
    }

    async fn delete(&self, note: &Note) -> Result<()> {
        let mut notes = self.notes.lock().map_err(|_| anyhow!("note store lock poisoned"))?;
        notes.retain(|n| n.id != note.id);
        Ok(())
    }

    async fn update(&self, note: &Note) -> Result<()> {
        let mut notes = self.notes.lock().map_err(|_| anyhow!("note store lock poisoned"))?;
        match notes.iter_mut().find(|n| n.id == note.id) {
            Some(slot) => {
                *slot = note.clone();
                Ok(())
            }
            None => bail!("note {} not found", note.id),
        }
    }
}
