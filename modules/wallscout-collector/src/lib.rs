pub mod collector;
pub mod cursor;
pub mod enrich;
pub mod explorer;
pub mod notify;
pub mod parser;
pub mod pipeline;
pub mod prune;
pub mod store;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use collector::{CollectorSettings, WallCollector};
pub use cursor::{Cursor, CursorStore, FileCursorStore, MemoryCursorStore};
pub use enrich::assemble_note;
pub use explorer::UserExplorer;
pub use pipeline::{CollectConsumer, HandleOutcome};
pub use prune::{prune_stale_notes, PruneStats};
