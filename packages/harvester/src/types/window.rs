//! Fetch windows: the concrete requests derived from a fetchable partition.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{
    config::HarvestConfig,
    partition::{Partition, PartitionKey},
};

/// Sort order of a paginated pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Wire form used in `sort=` query parameters.
    pub fn as_query(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// One page request against one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    pub key: PartitionKey,
    pub page_index: u32,
    pub direction: SortDirection,
}

/// Pages issued per direction for a partition of `size` results.
///
/// `min(ceil(size / page_size), max_pages)`.
pub fn pages_per_direction(size: u64, config: &HarvestConfig) -> u32 {
    let page_size = u64::from(config.page_size.max(1));
    let needed = size.div_ceil(page_size);
    needed.min(u64::from(config.max_pages)) as u32
}

/// Whether a partition of `size` results also gets a descending pass.
pub fn needs_descending(size: u64, config: &HarvestConfig) -> bool {
    size > config.single_pass_threshold
}

/// Derive every window for a partition.
///
/// Returns nothing for partitions that are not fetchable.
pub fn windows_for(partition: &Partition, config: &HarvestConfig) -> Vec<FetchWindow> {
    let size = match (partition.is_fetchable(), partition.size) {
        (true, Some(size)) => size,
        _ => return Vec::new(),
    };

    let pages = pages_per_direction(size, config);
    let mut directions = vec![SortDirection::Ascending];
    if needs_descending(size, config) {
        directions.push(SortDirection::Descending);
    }

    directions
        .into_iter()
        .flat_map(|direction| {
            (0..pages).map(move |page_index| FetchWindow {
                key: partition.key.clone(),
                page_index,
                direction,
            })
        })
        .collect()
}

/// Results of a partition no window can reach, given the page cap.
///
/// Ascending and descending passes are counted as disjoint, so this is a
/// lower bound on what is missed.
pub fn unreachable(size: u64, config: &HarvestConfig) -> u64 {
    let passes = if needs_descending(size, config) { 2 } else { 1 };
    size.saturating_sub(passes * config.pass_coverage())
}
