//! Record store: the only place harvested records are written.

use async_trait::async_trait;

use crate::error::HarvestResult;
use crate::types::record::{MissingDetail, Record, UpsertOutcome};

/// Persistent store for harvested records.
///
/// Writes are idempotent on `id`. Only the sink and backfill write here.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the record if its id is absent, otherwise update only
    /// `last_seen_date`.
    async fn upsert(&self, record: &Record) -> HarvestResult<UpsertOutcome>;

    /// Records whose detail document has not been stored yet.
    async fn select_missing_detail(&self) -> HarvestResult<Vec<MissingDetail>>;

    /// Store the detail document for a record.
    async fn update_detail(&self, id: i64, detail: &serde_json::Value) -> HarvestResult<()>;

    /// Get a record by id.
    async fn get_record(&self, id: i64) -> HarvestResult<Option<Record>>;

    /// Number of stored records.
    async fn count_records(&self) -> HarvestResult<usize>;
}
