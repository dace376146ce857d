//! Configuration for partition planning and harvesting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{HarvestError, HarvestResult};

/// Tunables for one harvesting run.
///
/// Built once by the caller and handed to every component that needs it;
/// nothing in the library reads process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Maximum results any single query can reach.
    ///
    /// A partition whose probed size is above this is oversized. The
    /// boundary is inclusive: `size == hard_cap` is still fetchable.
    /// Default: 20 000.
    pub hard_cap: u64,

    /// Size up to which one ascending pass is issued.
    ///
    /// Partitions above this (and within `hard_cap`) also get a descending
    /// pass. Default: 10 000.
    pub single_pass_threshold: u64,

    /// Page size for fetch windows. Default: 2 000.
    pub page_size: u32,

    /// Page cap per sort direction.
    ///
    /// Partitions larger than `max_pages * page_size` per direction cannot be
    /// fully reached; those are reported as truncated in the run summary
    /// rather than treated as covered. Default: 4.
    pub max_pages: u32,

    /// Page size used by size probes. Default: 1.
    pub probe_page_size: u32,

    /// Number of requests in flight at once. Default: 24.
    pub pool_size: usize,

    /// Extra attempts after a timeout or connection failure. Default: 2.
    pub timeout_retries: u32,

    /// Delay before a retry, multiplied by the attempt number. Default: 500.
    pub retry_backoff_ms: u64,

    /// Top-level region ids seeding the first planning stage.
    pub regions: Vec<i64>,

    /// Key a detail document must carry to be accepted by backfill.
    pub detail_marker: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            hard_cap: 20_000,
            single_pass_threshold: 10_000,
            page_size: 2_000,
            max_pages: 4,
            probe_page_size: 1,
            pool_size: 24,
            timeout_retries: 2,
            retry_backoff_ms: 500,
            regions: (1..=27).collect(),
            detail_marker: "mandado".to_string(),
        }
    }
}

impl HarvestConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hard result cap.
    pub fn with_hard_cap(mut self, cap: u64) -> Self {
        self.hard_cap = cap;
        self
    }

    /// Set the single-pass threshold.
    pub fn with_single_pass_threshold(mut self, threshold: u64) -> Self {
        self.single_pass_threshold = threshold;
        self
    }

    /// Set the fetch page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the page cap per direction.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the worker pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the retry bound for transient failures.
    pub fn with_timeout_retries(mut self, retries: u32) -> Self {
        self.timeout_retries = retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Set the top-level regions.
    pub fn with_regions(mut self, regions: impl IntoIterator<Item = i64>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }

    /// Set the detail marker key.
    pub fn with_detail_marker(mut self, marker: impl Into<String>) -> Self {
        self.detail_marker = marker.into();
        self
    }

    /// Results one sort direction can reach.
    pub fn pass_coverage(&self) -> u64 {
        u64::from(self.max_pages) * u64::from(self.page_size)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Reject settings the planner cannot work with.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.page_size == 0 || self.probe_page_size == 0 {
            return Err(HarvestError::Config("page sizes must be > 0".into()));
        }
        if self.max_pages == 0 {
            return Err(HarvestError::Config("max_pages must be > 0".into()));
        }
        if self.pool_size == 0 {
            return Err(HarvestError::Config("pool_size must be > 0".into()));
        }
        if self.single_pass_threshold > self.hard_cap {
            return Err(HarvestError::Config(format!(
                "single_pass_threshold ({}) exceeds hard_cap ({})",
                self.single_pass_threshold, self.hard_cap
            )));
        }
        Ok(())
    }
}
