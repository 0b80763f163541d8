use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use harvester_core::{merge_record, Record, RecordKey, RunSummary, UpsertOutcome};

use super::{RecordStore, StoreError};

#[derive(Default)]
struct Inner {
    records: BTreeMap<RecordKey, Record>,
    runs: Vec<RunSummary>,
    flushes: usize,
}

/// In-process store for tests and dry runs. Every write is immediately
/// visible; `flush` only counts calls.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stored for `group_key`, ordered by item id.
    pub fn records(&self, group_key: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|record| record.group_key == group_key)
            .cloned()
            .collect())
    }

    pub fn runs(&self) -> Result<Vec<RunSummary>, StoreError> {
        Ok(self.lock()?.runs.clone())
    }

    pub fn flush_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.flushes)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        if !record.is_identified() {
            return Err(StoreError::Unidentified);
        }
        let mut inner = self.lock()?;
        match inner.records.get_mut(&record.key()) {
            Some(stored) => {
                merge_record(stored, record);
                Ok(UpsertOutcome::Merged)
            }
            None => {
                inner.records.insert(record.key(), record.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.lock()?.flushes += 1;
        Ok(())
    }

    fn count(&self, group_key: &str) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .keys()
            .filter(|key| key.group_key == group_key)
            .count() as u64)
    }

    fn get(&self, source_item_id: &str, group_key: &str) -> Result<Option<Record>, StoreError> {
        let key = RecordKey {
            source_item_id: source_item_id.to_string(),
            group_key: group_key.to_string(),
        };
        Ok(self.lock()?.records.get(&key).cloned())
    }

    fn record_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        self.lock()?.runs.push(summary.clone());
        Ok(())
    }
}
