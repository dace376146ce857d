//! Query transport: executes one logical search query.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::types::{partition::PartitionKey, record::SearchPage, window::SortDirection};

/// Executes paginated search queries against the remote collection.
///
/// Implementations suspend only on network I/O. A structured API error is
/// returned as [`TransportError::Api`](crate::error::TransportError::Api),
/// distinct from timeouts and connection failures.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Run `filter` and return the page at `page_index`.
    ///
    /// `total_count` is the API's declared total for the whole query, not
    /// the number of items on this page.
    async fn search(
        &self,
        filter: &PartitionKey,
        page_index: u32,
        page_size: u32,
        direction: SortDirection,
    ) -> TransportResult<SearchPage>;
}
