use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use wallscout_common::WallScoutError;

use crate::store::{NoteFilter, NoteStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub stale: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl fmt::Display for PruneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stale notes, {} deleted, {} failed",
            self.stale, self.deleted, self.failed
        )
    }
}

/// Delete every note published before `now - max_age`.
///
/// A failed delete is logged and counted; the sweep carries on. Only the
/// initial lookup failing is an error.
pub async fn prune_stale_notes(
    store: &dyn NoteStore,
    now: DateTime<Utc>,
    max_age: chrono::Duration,
) -> Result<PruneStats, WallScoutError> {
    let horizon = now
        .checked_sub_signed(max_age)
        .map_or(i64::MIN, |t| t.timestamp());
    let stale = store
        .find(&NoteFilter {
            older_than: Some(horizon),
            ..Default::default()
        })
        .await
        .map_err(|e| WallScoutError::Store(format!("stale note lookup failed: {e:#}")))?;

    let mut stats = PruneStats {
        stale: stale.len(),
        ..Default::default()
    };

    for note in &stale {
        match store.delete(note).await {
            Ok(()) => stats.deleted += 1,
            Err(e) => {
                warn!(note_id = %note.id, city = %note.city, error = %e, "Failed to delete stale note");
                stats.failed += 1;
            }
        }
    }

    info!(horizon, %stats, "Stale notes pruned");
    Ok(stats)
}
