// Test mocks for the collector and pipeline.
//
// Mocks matching the trait boundaries:
// - MockFeed (FeedFetcher): offset→page body, records every query
// - MockUserLookup (UserLookup): id→listing body, counts calls per id
// - RecordingNotifier (NotifyPublisher): keeps published messages
// - FailingNoteStore (NoteStore): MemoryNoteStore with injectable failures
//
// Plus fixture helpers for sources, wall items and notes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use wallscout_common::{CollectMessage, Contact, Note, NotifyMessage, Source};

use crate::notify::NotifyPublisher;
use crate::store::{MemoryNoteStore, NoteFilter, NoteStore};
use crate::traits::{FeedFetcher, UserLookup};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Source of type 1 in "spb" paging 50 items from `owner_id`.
pub fn source(id: i64, owner_id: i64) -> Source {
    Source {
        id,
        source_type: 1,
        city: "spb".to_string(),
        parameters: json!({"owner_id": owner_id, "count": 50}).to_string(),
    }
}

/// A plain wall post by user `1000 + id`.
pub fn wall_item(id: i64, date: i64) -> Value {
    json!({
        "id": id,
        "from_id": 1000 + id,
        "date": date,
        "text": format!("post {id}"),
    })
}

/// A `wall.get` response body carrying `items`.
pub fn wall_page(items: &[Value]) -> String {
    json!({"response": {"count": items.len(), "items": items}}).to_string()
}

pub fn note(external_id: &str, description: &str, contact: &str, timestamp: i64) -> Note {
    Note::new(
        external_id.to_string(),
        format!("https://vk.com/wall-100_{external_id}"),
        description.to_string(),
        Contact {
            id: contact.to_string(),
            name: "Anna".to_string(),
            blacklisted: false,
        },
        1,
        "spb".to_string(),
        timestamp,
    )
}

pub fn collect_message(note: Note) -> CollectMessage {
    CollectMessage {
        note,
        source: source(42, -100),
    }
}

// ---------------------------------------------------------------------------
// MockFeed
// ---------------------------------------------------------------------------

/// Page bodies keyed by the `offset` query parameter. Unregistered offsets
/// fail like a transport error.
#[derive(Default)]
pub struct MockFeed {
    pages: HashMap<u64, String>,
    queries: Mutex<Vec<Vec<(String, String)>>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, offset: u64, items: &[Value]) -> Self {
        self.pages.insert(offset, wall_page(items));
        self
    }

    /// Serve `body` verbatim, for malformed responses.
    pub fn on_body(mut self, offset: u64, body: &str) -> Self {
        self.pages.insert(offset, body.to_string());
        self
    }

    pub fn queries(&self) -> Vec<Vec<(String, String)>> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.queries.lock().map(|q| q.len()).unwrap_or_default()
    }
}

#[async_trait]
impl FeedFetcher for MockFeed {
    async fn wall_page(&self, query: &[(String, String)]) -> Result<String> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_vec());
        }
        let offset: u64 = query
            .iter()
            .find(|(k, _)| k == "offset")
            .ok_or_else(|| anyhow!("MockFeed: query has no offset"))?
            .1
            .parse()?;
        self.pages
            .get(&offset)
            .cloned()
            .ok_or_else(|| anyhow!("MockFeed: no page registered for offset {offset}"))
    }
}

// ---------------------------------------------------------------------------
// MockUserLookup
// ---------------------------------------------------------------------------

/// Listing bodies keyed by user id. Unregistered ids fail.
#[derive(Default)]
pub struct MockUserLookup {
    listings: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockUserLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_user(mut self, id: i64, body: &str) -> Self {
        self.listings.insert(id.to_string(), body.to_string());
        self
    }

    /// Register `{id, first_name}` for each id.
    pub fn with_names(mut self, users: &[(i64, &str)]) -> Self {
        for (id, name) in users {
            let body = json!({"response": [{"id": id, "first_name": name}]}).to_string();
            self.listings.insert(id.to_string(), body);
        }
        self
    }

    pub fn calls(&self, id: i64) -> usize {
        self.calls
            .lock()
            .ok()
            .and_then(|c| c.get(&id.to_string()).copied())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UserLookup for MockUserLookup {
    async fn user_listing(&self, id: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(id.to_string()).or_default() += 1;
        }
        self.listings
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("MockUserLookup: no listing registered for {id}"))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<NotifyMessage>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<NotifyMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotifyPublisher for RecordingNotifier {
    async fn publish(&self, message: &NotifyMessage) -> Result<()> {
        if self.fail {
            bail!("RecordingNotifier: publish refused");
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingNoteStore
// ---------------------------------------------------------------------------

/// A [`MemoryNoteStore`] that fails selected operations.
#[derive(Default)]
pub struct FailingNoteStore {
    inner: MemoryNoteStore,
    failing_inserts: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_deletes: bool,
    fail_finds: bool,
    fail_contact_finds: bool,
}

impl FailingNoteStore {
    pub fn new(inner: MemoryNoteStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// Inserting a note with this external id fails.
    pub fn fail_insert_of(mut self, external_id: &str) -> Self {
        self.failing_inserts.insert(external_id.to_string());
        self
    }

    /// Deleting the note with this external id fails.
    pub fn fail_delete_of(mut self, external_id: &str) -> Self {
        self.failing_deletes.insert(external_id.to_string());
        self
    }

    pub fn fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn fail_finds(mut self) -> Self {
        self.fail_finds = true;
        self
    }

    /// Only lookups filtered by contact fail.
    pub fn fail_contact_finds(mut self) -> Self {
        self.fail_contact_finds = true;
        self
    }

    pub fn notes(&self) -> Vec<Note> {
        self.inner.notes()
    }
}

#[async_trait]
impl NoteStore for FailingNoteStore {
    async fn find(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        if self.fail_finds {
            bail!("FailingNoteStore: find refused");
        }
        if self.fail_contact_finds && filter.contact_id.is_some() {
            bail!("FailingNoteStore: contact find refused");
        }
        self.inner.find(filter).await
    }

    async fn insert(&self, note: &Note) -> Result<()> {
        if self.failing_inserts.contains(&note.external_id) {
            bail!("FailingNoteStore: insert of {} refused", note.external_id);
        }
        self.inner.insert(note).await
    }

    async fn delete(&self, note: &Note) -> Result<()> {
        if self.fail_deletes || self.failing_deletes.contains(&note.external_id) {
            bail!("FailingNoteStore: delete of {} refused", note.id);
        }
        self.inner.delete(note).await
    }

    async fn update(&self, note: &Note) -> Result<()> {
        self.inner.update(note).await
    }
}
