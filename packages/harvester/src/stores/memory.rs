//! In-memory record store for testing and dry runs.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::HarvestResult;
use crate::traits::store::RecordStore;
use crate::types::record::{MissingDetail, Record, UpsertOutcome};

/// In-memory storage for harvested records.
///
/// Keeps records in first-insertion order. Not suitable for production as
/// data is lost on restart.
pub struct MemoryStore {
    records: RwLock<IndexMap<i64, Record>>,
    detail_writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
            detail_writes: AtomicUsize::new(0),
        }
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.records.write().unwrap().clear();
        self.detail_writes.store(0, Ordering::SeqCst);
    }

    /// Get the number of stored records.
    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Number of `update_detail` calls served.
    pub fn detail_write_count(&self) -> usize {
        self.detail_writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<Record> {
        self.records.read().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: &Record) -> HarvestResult<UpsertOutcome> {
        let mut records = self.records.write().unwrap();
        match records.get_mut(&record.id) {
            Some(existing) => {
                existing.last_seen_date = record.last_seen_date;
                Ok(UpsertOutcome::Touched)
            }
            None => {
                records.insert(record.id, record.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn select_missing_detail(&self) -> HarvestResult<Vec<MissingDetail>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.detail.is_none())
            .map(|r| MissingDetail {
                id: r.id,
                type_code: r.type_code,
            })
            .collect())
    }

    async fn update_detail(&self, id: i64, detail: &serde_json::Value) -> HarvestResult<()> {
        self.detail_writes.fetch_add(1, Ordering::SeqCst);
        if let Some(record) = self.records.write().unwrap().get_mut(&id) {
            record.detail = Some(detail.clone());
        }
        Ok(())
    }

    async fn get_record(&self, id: i64) -> HarvestResult<Option<Record>> {
        Ok(self.records.read().unwrap().get(&id).cloned())
    }

    async fn count_records(&self) -> HarvestResult<usize> {
        Ok(self.record_count())
    }
}
