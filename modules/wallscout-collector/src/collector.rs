//! Incremental wall collector.
//!
//! One `collect` call is one cycle for one source: read the cursor, fetch a
//! single page at the cursor offset, admit the fresh items, persist the next
//! cursor and hand the admitted items to the record parser.
//!
//! Cycles for the same source must not overlap; the cursor read-modify-write
//! is not guarded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};

use wallscout_common::json::{is_truthy, value_as_i64, value_to_string};
use wallscout_common::{Config, RawNote, Source, WallScoutError};

use crate::cursor::{load_cursor, save_cursor, Cursor, CursorStore};
use crate::parser::RecordParser;
use crate::traits::FeedFetcher;

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Items older than `now - period` end the scan.
    pub period: chrono::Duration,
    /// Fixed cursor step per completed page, regardless of how many items survived filtering.
    pub stride: u64,
    /// Courtesy pause before each page request.
    pub request_delay: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            period: chrono::Duration::days(1),
            stride: 10,
            request_delay: Duration::from_millis(200),
        }
    }
}

impl CollectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            period: config.collect_period,
            stride: config.page_stride,
            request_delay: config.request_delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Page scan
// ---------------------------------------------------------------------------

/// The admission-relevant view of one wall item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub id: String,
    /// Unix seconds; 0 when absent.
    pub date: i64,
    pub marked_as_ads: bool,
    pub is_pinned: bool,
}

impl RawItem {
    /// `None` when the item carries no usable `id`.
    pub fn read(item: &Value) -> Option<Self> {
        let id = item.get("id").and_then(value_to_string)?;
        Some(Self {
            id,
            date: item.get("date").and_then(value_as_i64).unwrap_or(0),
            marked_as_ads: is_truthy(item.get("marked_as_ads")),
            is_pinned: is_truthy(item.get("is_pinned")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageScan {
    pub accepted: Vec<Value>,
    /// The cutoff was reached on this page.
    pub finished: bool,
}

/// Admit items in API order.
///
/// Items are assumed newest first, so the first non-pinned item older than
/// `cutoff` ends the scan. Ads are always dropped, as are pinned stale items
/// (which do not end the scan). An item without an id ends the scan without
/// finishing. Repeats of a composite id within the page are dropped.
pub fn scan_page(source: &Source, items: &[Value], cutoff: i64) -> PageScan {
    let mut seen = HashSet::new();
    let mut scan = PageScan::default();

    for item in items {
        let Some(raw) = RawItem::read(item) else {
            error!(source_id = source.id, source_type = source.source_type, "Item has no key \"id\", dropping rest of page");
            break;
        };

        if !seen.insert(source.composite_id(&raw.id)) {
            continue;
        }

        if raw.marked_as_ads {
            continue;
        }

        if raw.date < cutoff {
            if raw.is_pinned {
                continue;
            }
            scan.finished = true;
            break;
        }

        scan.accepted.push(item.clone());
    }

    scan
}

/// Pull `response.items` out of a `wall.get` body.
pub fn parse_wall_items(body: &str) -> Result<Vec<Value>, WallScoutError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| WallScoutError::Validation(format!("Response has invalid json: {e}")))?;
    let response = data
        .get("response")
        .ok_or_else(|| WallScoutError::Validation("Response has no key \"response\"".to_string()))?;
    let items = response
        .get("items")
        .ok_or_else(|| WallScoutError::Validation("Response has no key \"items\"".to_string()))?;
    items
        .as_array()
        .cloned()
        .ok_or_else(|| WallScoutError::Validation("Response \"items\" is not an array".to_string()))
}

// ---------------------------------------------------------------------------
// WallCollector
// ---------------------------------------------------------------------------

pub struct WallCollector {
    fetcher: Arc<dyn FeedFetcher>,
    cursors: Arc<dyn CursorStore>,
    parser: Arc<dyn RecordParser>,
    settings: CollectorSettings,
}

impl WallCollector {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        cursors: Arc<dyn CursorStore>,
        parser: Arc<dyn RecordParser>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            fetcher,
            cursors,
            parser,
            settings,
        }
    }

    pub async fn collect(&self, source: &Source) -> Vec<RawNote> {
        self.collect_at(source, Utc::now()).await
    }

    /// One collect cycle with an explicit clock. Never fails: every problem is
    /// logged and yields an empty batch.
    pub async fn collect_at(&self, source: &Source, now: DateTime<Utc>) -> Vec<RawNote> {
        debug!(source_id = source.id, source_type = source.source_type, city = %source.city, "Processing collect...");

        let params = match source.decode_parameters() {
            Ok(params) => params,
            Err(e) => {
                error!(
                    source_id = source.id,
                    source_type = source.source_type,
                    parameters = %source.parameters,
                    error = %e,
                    "Source parameters are invalid"
                );
                return Vec::new();
            }
        };

        let cursor = load_cursor(self.cursors.as_ref(), source).await;

        if cursor.finished {
            self.persist(source, Cursor::default()).await;
            debug!(source_id = source.id, source_type = source.source_type, "There are no more notes, cursor reset");
            return Vec::new();
        }

        if !self.settings.request_delay.is_zero() {
            tokio::time::sleep(self.settings.request_delay).await;
        }

        let query = params.to_query(cursor.offset);
        debug!(source_id = source.id, source_type = source.source_type, offset = cursor.offset, "Collect requesting...");

        let items = match self.fetch_items(&query).await {
            Ok(items) => items,
            Err(e) => {
                error!(
                    source_id = source.id,
                    source_type = source.source_type,
                    offset = cursor.offset,
                    error = %e,
                    "Collect request failed"
                );
                return Vec::new();
            }
        };

        let cutoff = now
            .checked_sub_signed(self.settings.period)
            .map_or(i64::MIN, |t| t.timestamp());
        let scan = scan_page(source, &items, cutoff);
        let next = cursor.advance(scan.finished, self.settings.stride);
        self.persist(source, next).await;

        debug!(
            source_id = source.id,
            source_type = source.source_type,
            fetched = items.len(),
            accepted = scan.accepted.len(),
            finished = scan.finished,
            next_offset = next.offset,
            "Processing collect... done"
        );

        scan.accepted
            .into_iter()
            .filter_map(|item| self.to_candidate(source, item))
            .collect()
    }

    async fn fetch_items(&self, query: &[(String, String)]) -> Result<Vec<Value>, WallScoutError> {
        let body = self.fetcher.wall_page(query).await?;
        parse_wall_items(&body)
    }

    async fn persist(&self, source: &Source, cursor: Cursor) {
        if let Err(e) = save_cursor(self.cursors.as_ref(), source, cursor).await {
            error!(
                source_id = source.id,
                source_type = source.source_type,
                offset = cursor.offset,
                finished = cursor.finished,
                error = %e,
                "Failed to persist cursor"
            );
        }
    }

    fn to_candidate(&self, source: &Source, item: Value) -> Option<RawNote> {
        match self.parser.parse(source, &item) {
            Ok(parsed) => Some(RawNote {
                id: source.composite_id(&parsed.id),
                link: parsed.link,
                timestamp: parsed.timestamp,
                content: item,
            }),
            Err(e) => {
                warn!(source_id = source.id, source_type = source.source_type, error = %e, "Failed to parse accepted item");
                None
            }
        }
    }
}
