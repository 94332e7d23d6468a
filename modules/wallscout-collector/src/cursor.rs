//! Per-source pagination state.
//!
//! The store is a plain byte KV. Encoding, versioning and corruption handling
//! live here: anything that does not decode as the current cursor record reads
//! as the default cursor instead of failing the cycle.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use wallscout_common::Source;

/// Version tag written with every cursor record.
pub const CURSOR_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub offset: u64,
    pub finished: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CursorRecord {
    version: u32,
    offset: u64,
    finished: bool,
}

impl Cursor {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let record = CursorRecord {
            version: CURSOR_VERSION,
            offset: self.offset,
            finished: self.finished,
        };
        Ok(serde_json::to_vec(&record)?)
    }

    /// `None` for anything that is not a current-version cursor record.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let record: CursorRecord = serde_json::from_slice(bytes).ok()?;
        if record.version != CURSOR_VERSION {
            return None;
        }
        Some(Self {
            offset: record.offset,
            finished: record.finished,
        })
    }

    /// Cursor after a completed page: parked at `{0, true}` once the cutoff was
    /// reached, otherwise moved forward by the fixed stride.
    pub fn advance(self, finished: bool, stride: u64) -> Self {
        if finished {
            Self {
                offset: 0,
                finished: true,
            }
        } else {
            Self {
                offset: self.offset + stride,
                finished: false,
            }
        }
    }
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Read the cursor for `source`, falling back to the default on any problem.
pub async fn load_cursor(store: &dyn CursorStore, source: &Source) -> Cursor {
    let key = source.cursor_key();

    match store.exists(&key).await {
        Ok(true) => {}
        Ok(false) => return Cursor::default(),
        Err(e) => {
            warn!(source_id = source.id, source_type = source.source_type, error = %e, "Cursor lookup failed, using default");
            return Cursor::default();
        }
    }

    match store.get(&key).await {
        Ok(Some(bytes)) => Cursor::decode(&bytes).unwrap_or_else(|| {
            warn!(source_id = source.id, source_type = source.source_type, bytes = bytes.len(), "Unreadable cursor blob, using default");
            Cursor::default()
        }),
        Ok(None) => Cursor::default(),
        Err(e) => {
            warn!(source_id = source.id, source_type = source.source_type, error = %e, "Cursor read failed, using default");
            Cursor::default()
        }
    }
}

pub async fn save_cursor(store: &dyn CursorStore, source: &Source, cursor: Cursor) -> Result<()> {
    let bytes = cursor.encode()?;
    store.put(&source.cursor_key(), &bytes).await
}

// ---------------------------------------------------------------------------
// FileCursorStore
// ---------------------------------------------------------------------------

/// One file per key under `dir`. Writes go through a temp file and a rename.
pub struct FileCursorStore {
    dir: PathBuf,
}

impl FileCursorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read cursor {}", path.display())),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cursor dir {}", self.dir.display()))?;

        let path = self.path(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("Failed to write cursor {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move cursor into {}", path.display()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path(key);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat cursor {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// MemoryCursorStore
// ---------------------------------------------------------------------------

/// Process-local cursor store, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryCursorStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor for `source`, if a decodable one is stored.
    pub fn cursor(&self, source: &Source) -> Option<Cursor> {
        let entries = self.entries.lock().ok()?;
        entries.get(&source.cursor_key()).and_then(|b| Cursor::decode(b))
    }

    /// Store raw bytes under `key`, bypassing cursor encoding.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_vec());
        }
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cursor store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cursor store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cursor store lock poisoned"))?;
        Ok(entries.contains_key(key))
    }
}
