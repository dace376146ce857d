//! Enumerator: lists the filter values one level below a partition.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::types::partition::{FilterValue, Level, PartitionKey};

/// Source of child filter values for drill-down.
#[async_trait]
pub trait Enumerator: Send + Sync {
    /// Values available at `level` beneath `parent`.
    ///
    /// For example the sub-regions of a region, or the agencies of a
    /// sub-region. The last levels are usually fixed lists.
    async fn list_children(
        &self,
        level: Level,
        parent: &PartitionKey,
    ) -> TransportResult<Vec<FilterValue>>;
}
