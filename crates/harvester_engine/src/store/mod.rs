//! Dedup & merge stores keyed by `(source_item_id, group_key)`.
mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use schema::{SchemaChoice, TableSchema};
pub use sqlite::SqliteStore;

use harvester_core::{Record, RunSummary, UpsertOutcome};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table schema: {0}")]
    InvalidSchema(String),
    #[error("record has no identity")]
    Unidentified,
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistent keyed table with an atomic insert-or-merge write.
///
/// Implementations serialise writes internally so several harvest loops may
/// share one store. Writes become durable on `flush`; rows flushed earlier
/// survive a crash before the next flush.
pub trait RecordStore: Send + Sync {
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError>;

    fn flush(&self) -> Result<(), StoreError>;

    fn count(&self, group_key: &str) -> Result<u64, StoreError>;

    fn get(&self, source_item_id: &str, group_key: &str) -> Result<Option<Record>, StoreError>;

    fn record_run(&self, summary: &RunSummary) -> Result<(), StoreError>;
}

impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        (**self).upsert(record)
    }

    fn flush(&self) -> Result<(), StoreError> {
        (**self).flush()
    }

    fn count(&self, group_key: &str) -> Result<u64, StoreError> {
        (**self).count(group_key)
    }

    fn get(&self, source_item_id: &str, group_key: &str) -> Result<Option<Record>, StoreError> {
        (**self).get(source_item_id, group_key)
    }

    fn record_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        (**self).record_run(summary)
    }
}
