//! Rate-limited transport wrapper.
//!
//! Wraps any collaborator with a requests-per-second quota using the
//! governor crate. Every request (search, enumeration, detail) takes a
//! permit.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::{HarvestError, HarvestResult, TransportResult};
use crate::traits::{detail::DetailSource, enumerator::Enumerator, transport::QueryTransport};
use crate::types::{
    partition::{FilterValue, Level, PartitionKey},
    record::{DetailOutcome, SearchPage},
    window::SortDirection,
};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A transport wrapper that enforces a request rate.
///
/// The limiter is shared by all workers of a pool, so the quota bounds the
/// whole run rather than each worker.
pub struct RateLimitedTransport<T> {
    inner: T,
    limiter: Arc<DefaultRateLimiter>,
}

impl<T> RateLimitedTransport<T> {
    /// Wrap `transport` with a sustained `requests_per_second` limit.
    pub fn new(transport: T, requests_per_second: u32) -> HarvestResult<Self> {
        let quota = Quota::per_second(non_zero(requests_per_second, "requests_per_second")?);
        Ok(Self::with_quota(transport, quota))
    }

    /// Create with a custom quota.
    pub fn with_quota(transport: T, quota: Quota) -> Self {
        Self {
            inner: transport,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create with burst support.
    pub fn with_burst(transport: T, requests_per_second: u32, burst: u32) -> HarvestResult<Self> {
        let quota = Quota::per_second(non_zero(requests_per_second, "requests_per_second")?)
            .allow_burst(non_zero(burst, "burst")?);
        Ok(Self::with_quota(transport, quota))
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

fn non_zero(value: u32, name: &str) -> HarvestResult<NonZeroU32> {
    NonZeroU32::new(value).ok_or_else(|| HarvestError::Config(format!("{} must be > 0", name)))
}

#[async_trait]
impl<T: QueryTransport> QueryTransport for RateLimitedTransport<T> {
    async fn search(
        &self,
        filter: &PartitionKey,
        page_index: u32,
        page_size: u32,
        direction: SortDirection,
    ) -> TransportResult<SearchPage> {
        self.wait_for_permit().await;
        self.inner.search(filter, page_index, page_size, direction).await
    }
}

#[async_trait]
impl<T: Enumerator> Enumerator for RateLimitedTransport<T> {
    async fn list_children(
        &self,
        level: Level,
        parent: &PartitionKey,
    ) -> TransportResult<Vec<FilterValue>> {
        self.wait_for_permit().await;
        self.inner.list_children(level, parent).await
    }
}

#[async_trait]
impl<T: DetailSource> DetailSource for RateLimitedTransport<T> {
    async fn get_detail(&self, id: i64, type_code: i32) -> TransportResult<DetailOutcome> {
        self.wait_for_permit().await;
        self.inner.get_detail(id, type_code).await
    }
}

/// Builder for RateLimitedTransport.
pub struct RateLimitedTransportBuilder<T> {
    transport: T,
    requests_per_second: u32,
    burst: Option<u32>,
}

impl<T> RateLimitedTransportBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            requests_per_second: 1,
            burst: None,
        }
    }

    /// Set requests per second.
    pub fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Set burst size.
    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn build(self) -> HarvestResult<RateLimitedTransport<T>> {
        match self.burst {
            Some(burst) => {
                RateLimitedTransport::with_burst(self.transport, self.requests_per_second, burst)
            }
            None => RateLimitedTransport::new(self.transport, self.requests_per_second),
        }
    }
}
