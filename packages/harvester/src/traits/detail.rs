//! Detail source: fetches the per-record detail document.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::types::record::DetailOutcome;

/// Per-record detail endpoint, used only by backfill.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn get_detail(&self, id: i64, type_code: i32) -> TransportResult<DetailOutcome>;
}
