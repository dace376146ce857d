//! Run summaries: what was harvested and where coverage is known to be
//! incomplete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::partition::{Level, Partition, PartitionKey};

/// A partition dropped from a run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPartition {
    pub key: PartitionKey,
    pub level: Level,
    pub reason: String,
}

/// A fetchable partition its windows cannot fully reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncatedPartition {
    pub key: PartitionKey,
    pub size: u64,
    /// Lower bound on results no window reaches
    pub unreachable: u64,
}

/// Outcome of a completed harvesting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Probes answered, across all stages
    pub partitions_probed: usize,
    pub empty: usize,
    pub fetchable: usize,

    /// Partitions lost to probe or enumeration failures
    pub skipped: Vec<SkippedPartition>,

    /// Oversized at the last level; never silently dropped
    pub max_depth_oversized: Vec<Partition>,

    /// Fetchable but larger than the page cap lets us reach
    pub truncated: Vec<TruncatedPartition>,

    pub windows_planned: usize,
    pub windows_skipped: usize,

    pub records_observed: usize,
    pub records_inserted: usize,
    pub records_touched: usize,
    pub duplicates: usize,
}

impl HarvestSummary {
    /// True when any part of the query space is known to be uncovered.
    pub fn has_coverage_gaps(&self) -> bool {
        !self.skipped.is_empty()
            || !self.max_depth_oversized.is_empty()
            || !self.truncated.is_empty()
            || self.windows_skipped > 0
    }
}
