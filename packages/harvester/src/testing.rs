//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the planner, fetch scheduler and backfill
//! without a live search API.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{TransportError, TransportResult};
use crate::traits::{detail::DetailSource, enumerator::Enumerator, transport::QueryTransport};
use crate::types::{
    partition::{FilterValue, Level, PartitionKey},
    record::{DetailOutcome, SearchItem, SearchPage},
    window::SortDirection,
};

/// Failure to inject into a mock response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Transport timeout (transient)
    Timeout,
    /// Structured API error with this HTTP status
    Api { status: u16 },
    /// Body that does not decode
    Malformed,
}

impl MockFailure {
    fn into_error(self, context: String) -> TransportError {
        match self {
            MockFailure::Timeout => TransportError::Timeout { context },
            MockFailure::Api { status } => TransportError::Api {
                status: Some(status),
                kind: if status == 401 { "unauthorized" } else { "error" }.to_string(),
                message: format!("mock failure for {}", context),
            },
            MockFailure::Malformed => TransportError::Decode(format!("mock malformed body for {}", context)),
        }
    }
}

/// Record of a call made to the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockTransportCall {
    Search {
        filter: PartitionKey,
        page_index: u32,
        page_size: u32,
        direction: SortDirection,
    },
    ListChildren {
        level: Level,
        parent: PartitionKey,
    },
    GetDetail {
        id: i64,
        type_code: i32,
    },
}

#[derive(Debug, Clone, Default)]
struct MockPartition {
    total: u64,
    items: Vec<SearchItem>,
}

/// A mock search API.
///
/// Implements every collaborator trait. Unknown partitions report zero
/// results, unknown parents have no children and unknown detail ids are not
/// found.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Declared totals and items by partition
    partitions: Arc<RwLock<HashMap<PartitionKey, MockPartition>>>,

    /// Child values by parent key
    children: Arc<RwLock<HashMap<PartitionKey, Vec<FilterValue>>>>,

    /// Detail documents by record id
    details: Arc<RwLock<HashMap<i64, DetailOutcome>>>,

    /// Failures for every search on a key
    search_failures: Arc<RwLock<HashMap<PartitionKey, MockFailure>>>,

    /// Failures for fetch-sized searches on a key; probes still succeed
    fetch_failures: Arc<RwLock<HashMap<PartitionKey, MockFailure>>>,

    /// Remaining timeouts before searches on a key succeed
    timeouts: Arc<RwLock<HashMap<PartitionKey, usize>>>,

    child_failures: Arc<RwLock<HashMap<PartitionKey, MockFailure>>>,
    detail_failures: Arc<RwLock<HashMap<i64, MockFailure>>>,

    latency: Option<Duration>,

    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockTransportCall>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a partition's total without any items.
    pub fn with_size(self, key: PartitionKey, total: u64) -> Self {
        self.partitions
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .total = total;
        self
    }

    /// Serve `items` for a partition, declaring their count as its total.
    pub fn with_items(self, key: PartitionKey, items: Vec<SearchItem>) -> Self {
        let total = items.len() as u64;
        self.with_partition(key, total, items)
    }

    /// Serve `items` for a partition with an explicit declared total.
    pub fn with_partition(self, key: PartitionKey, total: u64, items: Vec<SearchItem>) -> Self {
        self.partitions
            .write()
            .unwrap()
            .insert(key, MockPartition { total, items });
        self
    }

    /// Children returned when enumerating below `parent`.
    pub fn with_children(self, parent: PartitionKey, values: Vec<FilterValue>) -> Self {
        self.children.write().unwrap().insert(parent, values);
        self
    }

    pub fn with_detail(self, id: i64, outcome: DetailOutcome) -> Self {
        self.details.write().unwrap().insert(id, outcome);
        self
    }

    /// Fail every search on `key`.
    pub fn fail_search(self, key: PartitionKey, failure: MockFailure) -> Self {
        self.search_failures.write().unwrap().insert(key, failure);
        self
    }

    /// Fail searches on `key` with a page size above one (fetch windows).
    pub fn fail_fetch(self, key: PartitionKey, failure: MockFailure) -> Self {
        self.fetch_failures.write().unwrap().insert(key, failure);
        self
    }

    /// Time out the first `times` searches on `key`.
    pub fn timeout_times(self, key: PartitionKey, times: usize) -> Self {
        self.timeouts.write().unwrap().insert(key, times);
        self
    }

    pub fn fail_children(self, parent: PartitionKey, failure: MockFailure) -> Self {
        self.child_failures.write().unwrap().insert(parent, failure);
        self
    }

    pub fn fail_detail(self, id: i64, failure: MockFailure) -> Self {
        self.detail_failures.write().unwrap().insert(id, failure);
        self
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockTransportCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of search calls (probes and fetches).
    pub fn search_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, MockTransportCall::Search { .. }))
            .count()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    async fn enter(&self, call: MockTransportCall) -> InFlight {
        self.calls.write().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(self.in_flight.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn take_timeout(&self, key: &PartitionKey) -> bool {
        let mut timeouts = self.timeouts.write().unwrap();
        match timeouts.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueryTransport for MockTransport {
    async fn search(
        &self,
        filter: &PartitionKey,
        page_index: u32,
        page_size: u32,
        direction: SortDirection,
    ) -> TransportResult<SearchPage> {
        let _guard = self
            .enter(MockTransportCall::Search {
                filter: filter.clone(),
                page_index,
                page_size,
                direction,
            })
            .await;
        let context = format!("search {} page {}", filter, page_index);

        if self.take_timeout(filter) {
            return Err(MockFailure::Timeout.into_error(context));
        }
        if let Some(failure) = self.search_failures.read().unwrap().get(filter).copied() {
            return Err(failure.into_error(context));
        }
        if page_size > 1 {
            if let Some(failure) = self.fetch_failures.read().unwrap().get(filter).copied() {
                return Err(failure.into_error(context));
            }
        }

        let partitions = self.partitions.read().unwrap();
        let Some(partition) = partitions.get(filter) else {
            return Ok(SearchPage::default());
        };

        let start = (page_index as usize).saturating_mul(page_size as usize);
        let ordered: Box<dyn Iterator<Item = &SearchItem>> = match direction {
            SortDirection::Ascending => Box::new(partition.items.iter()),
            SortDirection::Descending => Box::new(partition.items.iter().rev()),
        };
        let items = ordered.skip(start).take(page_size as usize).cloned().collect();

        Ok(SearchPage {
            total_count: partition.total,
            items,
        })
    }
}

#[async_trait]
impl Enumerator for MockTransport {
    async fn list_children(
        &self,
        level: Level,
        parent: &PartitionKey,
    ) -> TransportResult<Vec<FilterValue>> {
        let _guard = self
            .enter(MockTransportCall::ListChildren {
                level,
                parent: parent.clone(),
            })
            .await;

        if let Some(failure) = self.child_failures.read().unwrap().get(parent).copied() {
            return Err(failure.into_error(format!("enumerate {} under {}", level, parent)));
        }

        Ok(self
            .children
            .read()
            .unwrap()
            .get(parent)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl DetailSource for MockTransport {
    async fn get_detail(&self, id: i64, type_code: i32) -> TransportResult<DetailOutcome> {
        let _guard = self.enter(MockTransportCall::GetDetail { id, type_code }).await;

        if let Some(failure) = self.detail_failures.read().unwrap().get(&id).copied() {
            return Err(failure.into_error(format!("detail {}/{}", id, type_code)));
        }

        Ok(self
            .details
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(DetailOutcome::NotFound))
    }
}

/// A deterministic search item for `id`.
pub fn sample_item(id: i64) -> SearchItem {
    SearchItem {
        id,
        type_code: 1,
        process_number: format!("{:020}", id),
        piece_number: format!("{:020}01000403", id),
        expedition_date: NaiveDate::from_ymd_opt(2021, 3, 3).unwrap_or_default(),
    }
}
