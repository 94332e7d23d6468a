//! Deduplication and publish pipeline for inbound collect messages.
//!
//! Per message: drop exact re-deliveries, delete stored notes the new one
//! supersedes (same description, or same contact and type), store the new note
//! flagged as duplicated if anything was deleted, and announce it unless a
//! superseded note was announced recently enough.
//!
//! Store calls are independent round trips with no transaction around them.
//! A crash between the deletes and the insert loses the superseded notes; any
//! failure after the first delete, up to and including the insert, is answered
//! by re-inserting them.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use wallscout_common::{CollectMessage, Config, Note, NotifyMessage, Source};

use crate::notify::NotifyPublisher;
use crate::store::{DuplicateFinder, NoteStore};

/// What happened to one collect message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The note was stored.
    Accepted { duplicated: bool, notified: bool },
    /// A note for the same wall item already exists; nothing was written.
    DuplicateDiscarded,
    /// Processing failed part way and was logged.
    ErrorSuppressed,
}

impl HandleOutcome {
    /// Queue acknowledgement: `false` only for discarded re-deliveries. Failures
    /// are acknowledged too, so a poison message is not redelivered forever.
    pub fn acknowledge(&self) -> bool {
        !matches!(self, HandleOutcome::DuplicateDiscarded)
    }
}

/// Notes removed in one pass and the newest timestamp among them.
#[derive(Debug, Default)]
struct DuplicateSweep {
    deleted: Vec<Note>,
    watermark: Option<i64>,
}

impl DuplicateSweep {
    fn is_duplicate(&self) -> bool {
        !self.deleted.is_empty()
    }

    fn contains(&self, note: &Note) -> bool {
        self.deleted.iter().any(|n| n.id == note.id)
    }

    fn record(&mut self, note: Note) {
        self.watermark = Some(self.watermark.map_or(note.timestamp, |w| w.max(note.timestamp)));
        self.deleted.push(note);
    }
}

/// Whether a note should be announced given the newest superseded timestamp.
/// With no duplicates it always is; otherwise only when that duplicate is
/// older than `now - period`. A period reaching past the earliest
/// representable time suppresses every duplicate.
pub fn should_notify(watermark: Option<i64>, now: DateTime<Utc>, period: chrono::Duration) -> bool {
    match watermark {
        None => true,
        Some(ts) => now
            .checked_sub_signed(period)
            .is_some_and(|horizon| ts < horizon.timestamp()),
    }
}

pub struct CollectConsumer {
    finder: Arc<dyn DuplicateFinder>,
    notes: Arc<dyn NoteStore>,
    notifier: Arc<dyn NotifyPublisher>,
    notify_duplicate_period: chrono::Duration,
}

impl CollectConsumer {
    pub fn new(
        finder: Arc<dyn DuplicateFinder>,
        notes: Arc<dyn NoteStore>,
        notifier: Arc<dyn NotifyPublisher>,
        notify_duplicate_period: chrono::Duration,
    ) -> Self {
        Self {
            finder,
            notes,
            notifier,
            notify_duplicate_period,
        }
    }

    pub fn from_config(
        config: &Config,
        finder: Arc<dyn DuplicateFinder>,
        notes: Arc<dyn NoteStore>,
        notifier: Arc<dyn NotifyPublisher>,
    ) -> Self {
        Self::new(finder, notes, notifier, config.notify_duplicate_period)
    }

    pub async fn handle(&self, message: CollectMessage) -> HandleOutcome {
        self.handle_at(message, Utc::now()).await
    }

    /// Handle one message with an explicit clock. Never fails; see [`HandleOutcome`].
    pub async fn handle_at(&self, message: CollectMessage, now: DateTime<Utc>) -> HandleOutcome {
        let CollectMessage { note, source } = message;
        let note_id = note.id;
        let external_id = note.external_id.clone();

        debug!(note_id = %note_id, external_id = %external_id, city = %source.city, "Handling message...");

        match self.process(note, &source, now).await {
            Ok(outcome) => {
                debug!(note_id = %note_id, city = %source.city, outcome = ?outcome, "Handling message... done");
                outcome
            }
            Err(e) => {
                error!(
                    note_id = %note_id,
                    external_id = %external_id,
                    city = %source.city,
                    source_id = source.id,
                    source_type = source.source_type,
                    error = format!("{e:#}"),
                    "Handle error"
                );
                HandleOutcome::ErrorSuppressed
            }
        }
    }

    async fn process(&self, mut note: Note, source: &Source, now: DateTime<Utc>) -> Result<HandleOutcome> {
        let same_item = self
            .finder
            .find_external_id_duplicates(&note)
            .await
            .context("external id lookup failed")?;
        if !same_item.is_empty() {
            debug!(note_id = %note.id, external_id = %note.external_id, city = %source.city, "Filtered by unique external id");
            return Ok(HandleOutcome::DuplicateDiscarded);
        }

        let mut sweep = DuplicateSweep::default();
        let replaced = self.replace_duplicates(&mut note, source, &mut sweep).await;
        if let Err(e) = replaced {
            self.restore(&note, source, &sweep.deleted).await;
            return Err(e);
        }

        let notify = should_notify(sweep.watermark, now, self.notify_duplicate_period);
        if notify {
            debug!(note_id = %note.id, city = %source.city, "Notify note");
            self.notifier
                .publish(&NotifyMessage { note: note.clone() })
                .await
                .context("notify publish failed")?;
        } else {
            debug!(note_id = %note.id, city = %source.city, watermark = ?sweep.watermark, "Notify canceled by duplicate");
        }

        Ok(HandleOutcome::Accepted {
            duplicated: note.duplicated,
            notified: notify,
        })
    }

    /// Delete superseded notes and store `note` in their place. Whatever was
    /// deleted before a failure is left in `sweep` for the caller to restore.
    async fn replace_duplicates(&self, note: &mut Note, source: &Source, sweep: &mut DuplicateSweep) -> Result<()> {
        let by_description = self
            .finder
            .find_description_duplicates(note)
            .await
            .context("description lookup failed")?;
        self.delete_duplicates(note, source, by_description, "description", sweep)
            .await?;

        let by_contact = self
            .finder
            .find_contact_type_duplicates(note)
            .await
            .context("contact lookup failed")?;
        self.delete_duplicates(note, source, by_contact, "contact_type", sweep)
            .await?;

        note.duplicated = sweep.is_duplicate();
        self.notes.insert(note).await.context("note insert failed")
    }

    async fn delete_duplicates(
        &self,
        note: &Note,
        source: &Source,
        duplicates: Vec<Note>,
        criterion: &'static str,
        sweep: &mut DuplicateSweep,
    ) -> Result<()> {
        for duplicate in duplicates {
            if sweep.contains(&duplicate) {
                continue;
            }
            debug!(
                note_id = %note.id,
                city = %source.city,
                duplicate_id = %duplicate.id,
                criterion,
                description_hash = %note.description_hash,
                "Delete duplicate"
            );
            self.notes
                .delete(&duplicate)
                .await
                .with_context(|| format!("failed to delete duplicate {}", duplicate.id))?;
            sweep.record(duplicate);
        }
        Ok(())
    }

    /// Put superseded notes back after replacing them failed part way.
    async fn restore(&self, note: &Note, source: &Source, deleted: &[Note]) {
        if deleted.is_empty() {
            return;
        }
        let mut restored = 0usize;
        for duplicate in deleted {
            match self.notes.insert(duplicate).await {
                Ok(()) => restored += 1,
                Err(e) => warn!(
                    note_id = %note.id,
                    city = %source.city,
                    duplicate_id = %duplicate.id,
                    error = %e,
                    "Failed to restore superseded note"
                ),
            }
        }
        info!(note_id = %note.id, city = %source.city, restored, deleted = deleted.len(), "Restored superseded notes after failed replace");
    }
}
