//! Collect cycles against a mocked feed and in-memory cursors.
//!
//! Source 42 pages the wall of community -100, 50 items at a time. The clock
//! is pinned so item ages are exact.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use wallscout_collector::cursor::{save_cursor, Cursor, CursorStore, FileCursorStore, MemoryCursorStore};
use wallscout_collector::parser::WallPostParser;
use wallscout_collector::testing::{source, wall_item, MockFeed};
use wallscout_collector::{CollectorSettings, WallCollector};
use wallscout_common::{RawNote, Source};

const NOW: i64 = 1_800_000_000;
const DAY: i64 = 86_400;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(NOW, 0).unwrap()
}

fn settings() -> CollectorSettings {
    CollectorSettings {
        period: chrono::Duration::days(1),
        stride: 10,
        request_delay: Duration::ZERO,
    }
}

/// Ten posts, newest first, all inside the window.
fn fresh_page() -> Vec<Value> {
    (1..=10).map(|id| wall_item(id, NOW - id * 60)).collect()
}

fn collector(feed: Arc<MockFeed>, cursors: Arc<dyn CursorStore>) -> WallCollector {
    WallCollector::new(feed, cursors, Arc::new(WallPostParser), settings())
}

fn ids(notes: &[RawNote]) -> Vec<String> {
    notes.iter().map(|n| n.id.clone()).collect()
}

fn wall_source() -> Source {
    source(42, -100)
}

#[tokio::test]
async fn full_fresh_page_advances_by_stride() {
    let feed = Arc::new(MockFeed::new().on_page(0, &fresh_page()));
    let cursors = Arc::new(MemoryCursorStore::new());
    let collector = collector(feed.clone(), cursors.clone());

    let notes = collector.collect_at(&wall_source(), now()).await;

    assert_eq!(notes.len(), 10);
    assert_eq!(notes[0].id, "42-1");
    assert_eq!(notes[0].link, "https://vk.com/wall-100_1");
    assert_eq!(notes[0].timestamp, NOW - 60);
    assert_eq!(notes[0].content["text"], "post 1");
    assert_eq!(
        cursors.cursor(&wall_source()),
        Some(Cursor {
            offset: 10,
            finished: false
        })
    );

    let query = &feed.queries()[0];
    assert!(query.contains(&("owner_id".to_string(), "-100".to_string())));
    assert!(query.contains(&("count".to_string(), "50".to_string())));
    assert!(query.contains(&("offset".to_string(), "0".to_string())));
}

#[tokio::test]
async fn stale_item_finishes_pass_then_one_empty_cycle_resets() {
    let mut page = fresh_page();
    page[5] = wall_item(6, NOW - 2 * DAY);
    let feed = Arc::new(MockFeed::new().on_page(0, &page));
    let cursors = Arc::new(MemoryCursorStore::new());
    let collector = collector(feed.clone(), cursors.clone());

    let notes = collector.collect_at(&wall_source(), now()).await;

    assert_eq!(ids(&notes), vec!["42-1", "42-2", "42-3", "42-4", "42-5"]);
    assert_eq!(
        cursors.cursor(&wall_source()),
        Some(Cursor {
            offset: 0,
            finished: true
        })
    );

    let notes = collector.collect_at(&wall_source(), now()).await;

    assert!(notes.is_empty());
    assert_eq!(cursors.cursor(&wall_source()), Some(Cursor::default()));
    assert_eq!(feed.request_count(), 1, "reset cycle must not hit the feed");

    let notes = collector.collect_at(&wall_source(), now()).await;
    assert_eq!(notes.len(), 5);
    assert_eq!(feed.request_count(), 2);
}

#[tokio::test]
async fn second_page_is_requested_at_stride_offset() {
    let second: Vec<Value> = (11..=13).map(|id| wall_item(id, NOW - id * 60)).collect();
    let feed = Arc::new(MockFeed::new().on_page(0, &fresh_page()).on_page(10, &second));
    let cursors = Arc::new(MemoryCursorStore::new());
    let collector = collector(feed.clone(), cursors.clone());

    collector.collect_at(&wall_source(), now()).await;
    let notes = collector.collect_at(&wall_source(), now()).await;

    assert_eq!(ids(&notes), vec!["42-11", "42-12", "42-13"]);
    assert_eq!(cursors.cursor(&wall_source()).map(|c| c.offset), Some(20));
}

#[tokio::test]
async fn same_cursor_and_feed_give_same_result() {
    let mut page = fresh_page();
    page[2] = serde_json::json!({"id": 3, "date": NOW - 10, "marked_as_ads": 1});
    let feed = Arc::new(MockFeed::new().on_page(0, &page));

    let first_store = Arc::new(MemoryCursorStore::new());
    let second_store = Arc::new(MemoryCursorStore::new());
    let first = collector(feed.clone(), first_store.clone())
        .collect_at(&wall_source(), now())
        .await;
    let second = collector(feed.clone(), second_store.clone())
        .collect_at(&wall_source(), now())
        .await;

    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first.len(), 9);
    assert_eq!(first_store.cursor(&wall_source()), second_store.cursor(&wall_source()));
}

#[tokio::test]
async fn transport_failure_leaves_cursor_untouched() {
    let feed = Arc::new(MockFeed::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let parked = Cursor {
        offset: 20,
        finished: false,
    };
    save_cursor(cursors.as_ref(), &wall_source(), parked).await.unwrap();

    let notes = collector(feed.clone(), cursors.clone())
        .collect_at(&wall_source(), now())
        .await;

    assert!(notes.is_empty());
    assert_eq!(feed.request_count(), 1);
    assert_eq!(cursors.cursor(&wall_source()), Some(parked));
}

#[tokio::test]
async fn malformed_response_leaves_cursor_untouched() {
    let feed = Arc::new(MockFeed::new().on_body(0, r#"{"error":{"error_code":15,"error_msg":"Access denied"}}"#));
    let cursors = Arc::new(MemoryCursorStore::new());

    let notes = collector(feed, cursors.clone()).collect_at(&wall_source(), now()).await;

    assert!(notes.is_empty());
    assert_eq!(cursors.cursor(&wall_source()), None);
}

#[tokio::test]
async fn invalid_parameters_skip_the_cycle() {
    let feed = Arc::new(MockFeed::new().on_page(0, &fresh_page()));
    let cursors = Arc::new(MemoryCursorStore::new());
    let mut broken = wall_source();
    broken.parameters = r#"{"owner_id":-100}"#.to_string();

    let notes = collector(feed.clone(), cursors.clone()).collect_at(&broken, now()).await;

    assert!(notes.is_empty());
    assert_eq!(feed.request_count(), 0);
    assert_eq!(cursors.cursor(&broken), None);
}

#[tokio::test]
async fn corrupt_cursor_reads_as_fresh_start() {
    let feed = Arc::new(MockFeed::new().on_page(0, &fresh_page()));
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors.insert_raw("config_42", b"a:2:{s:6:\"offset\";i:30;}");

    let notes = collector(feed.clone(), cursors.clone())
        .collect_at(&wall_source(), now())
        .await;

    assert_eq!(notes.len(), 10);
    assert_eq!(feed.queries()[0].last(), Some(&("offset".to_string(), "0".to_string())));
    assert_eq!(cursors.cursor(&wall_source()).map(|c| c.offset), Some(10));
}

#[tokio::test]
async fn file_cursors_survive_a_new_collector() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(MockFeed::new().on_page(0, &fresh_page()).on_page(10, &[]));

    collector(feed.clone(), Arc::new(FileCursorStore::new(dir.path())))
        .collect_at(&wall_source(), now())
        .await;
    collector(feed.clone(), Arc::new(FileCursorStore::new(dir.path())))
        .collect_at(&wall_source(), now())
        .await;

    let offsets: Vec<String> = feed
        .queries()
        .iter()
        .filter_map(|q| q.iter().find(|(k, _)| k == "offset").map(|(_, v)| v.clone()))
        .collect();
    assert_eq!(offsets, vec!["0", "10"]);
    assert!(dir.path().join("config_42").exists());
}

#[tokio::test]
async fn period_beyond_calendar_admits_everything() {
    let mut page = fresh_page();
    page[5] = wall_item(6, 0);
    let feed = Arc::new(MockFeed::new().on_page(0, &page));
    let cursors = Arc::new(MemoryCursorStore::new());
    let collector = WallCollector::new(
        feed,
        cursors.clone(),
        Arc::new(WallPostParser),
        CollectorSettings {
            period: chrono::Duration::days(365 * 1_000_000),
            ..settings()
        },
    );

    let notes = collector.collect_at(&wall_source(), now()).await;

    assert_eq!(notes.len(), 10);
    assert_eq!(cursors.cursor(&wall_source()).map(|c| c.finished), Some(false));
}
