//! Partitions of the query space.
//!
//! A partition narrows the search along the hierarchy
//! `region → sub-region → agency → record type → name initial`. Each level
//! adds exactly one filter value to the parent's key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One level of the filter hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Region,
    SubRegion,
    Agency,
    RecordType,
    NameInitial,
}

impl Level {
    /// Number of hierarchy levels.
    pub const COUNT: usize = 5;

    /// All levels, shallowest first.
    pub const ALL: [Level; Level::COUNT] = [
        Level::Region,
        Level::SubRegion,
        Level::Agency,
        Level::RecordType,
        Level::NameInitial,
    ];

    /// Position in the hierarchy (0 for regions).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The level below this one, if any.
    pub fn next(self) -> Option<Level> {
        Level::ALL.get(self.index() + 1).copied()
    }

    /// Oversized partitions at the last level cannot be split further.
    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Region => "region",
            Level::SubRegion => "sub_region",
            Level::Agency => "agency",
            Level::RecordType => "record_type",
            Level::NameInitial => "name_initial",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single filter value at one level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Numeric id (regions, sub-regions, agencies, record types)
    Id(i64),
    /// Free-text initial; match sets of different initials may overlap
    Initial(char),
}

impl FilterValue {
    pub fn as_id(&self) -> Option<i64> {
        match self {
            FilterValue::Id(id) => Some(*id),
            FilterValue::Initial(_) => None,
        }
    }

    pub fn as_initial(&self) -> Option<char> {
        match self {
            FilterValue::Initial(c) => Some(*c),
            FilterValue::Id(_) => None,
        }
    }
}

impl From<i64> for FilterValue {
    fn from(id: i64) -> Self {
        FilterValue::Id(id)
    }
}

impl From<char> for FilterValue {
    fn from(c: char) -> Self {
        FilterValue::Initial(c)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Id(id) => write!(f, "{}", id),
            FilterValue::Initial(c) => write!(f, "{}", c),
        }
    }
}

/// Filter values chosen so far, one slot per level.
///
/// The region slot is always set. A slot is set only if every slot above it
/// is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    values: [Option<FilterValue>; Level::COUNT],
}

impl PartitionKey {
    /// Key for a top-level region.
    pub fn region(id: i64) -> Self {
        let mut values: [Option<FilterValue>; Level::COUNT] = Default::default();
        values[Level::Region.index()] = Some(FilterValue::Id(id));
        Self { values }
    }

    /// Key for the child at `level`, inheriting every value of this key.
    ///
    /// The level above `level` must already be set.
    pub fn child(&self, level: Level, value: impl Into<FilterValue>) -> Self {
        debug_assert!(
            level.index() > 0 && self.values[level.index() - 1].is_some(),
            "{} cannot be chosen below {}",
            level,
            self
        );
        let mut values = self.values.clone();
        values[level.index()] = Some(value.into());
        Self { values }
    }

    /// Value at `level`, if chosen.
    pub fn get(&self, level: Level) -> Option<&FilterValue> {
        self.values[level.index()].as_ref()
    }

    /// Numeric id at `level`, if chosen.
    pub fn id(&self, level: Level) -> Option<i64> {
        self.get(level).and_then(FilterValue::as_id)
    }

    pub fn region_id(&self) -> Option<i64> {
        self.id(Level::Region)
    }

    pub fn name_initial(&self) -> Option<char> {
        self.get(Level::NameInitial).and_then(FilterValue::as_initial)
    }

    /// Deepest level with a value.
    pub fn depth(&self) -> Level {
        Level::ALL
            .iter()
            .rev()
            .copied()
            .find(|level| self.get(*level).is_some())
            .unwrap_or(Level::Region)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in Level::ALL {
            if let Some(value) = self.get(level) {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}={}", level, value)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Lifecycle of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Unprobed,
    /// Probe reported no results
    Empty,
    /// 0 < size <= hard cap
    Fetchable,
    /// size > hard cap, still splittable
    Oversized,
    /// size > hard cap at the last level; a permanent coverage gap
    MaxDepthOversized,
}

impl PartitionStatus {
    /// Classify a probed size against the hard cap.
    pub fn classify(size: u64, hard_cap: u64) -> Self {
        if size == 0 {
            PartitionStatus::Empty
        } else if size <= hard_cap {
            PartitionStatus::Fetchable
        } else {
            PartitionStatus::Oversized
        }
    }
}

/// A node in the filter hierarchy with its probed size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub key: PartitionKey,
    pub level: Level,
    pub size: Option<u64>,
    pub status: PartitionStatus,
}

impl Partition {
    /// An unprobed top-level partition.
    pub fn root(region: i64) -> Self {
        Self {
            key: PartitionKey::region(region),
            level: Level::Region,
            size: None,
            status: PartitionStatus::Unprobed,
        }
    }

    /// The unprobed child for `value` at the next level.
    ///
    /// Returns `None` at the last level.
    pub fn child(&self, value: impl Into<FilterValue>) -> Option<Partition> {
        let level = self.level.next()?;
        Some(Partition {
            key: self.key.child(level, value),
            level,
            size: None,
            status: PartitionStatus::Unprobed,
        })
    }

    /// Record the result of a probe.
    ///
    /// A partition is classified once; later calls leave it unchanged.
    pub fn record_probe(&mut self, size: u64, hard_cap: u64) -> PartitionStatus {
        if self.status == PartitionStatus::Unprobed {
            self.size = Some(size);
            self.status = PartitionStatus::classify(size, hard_cap);
        }
        self.status
    }

    /// Turn an oversized last-level partition into a terminal gap.
    pub fn mark_exhausted(&mut self) {
        if self.status == PartitionStatus::Oversized && self.level.is_last() {
            self.status = PartitionStatus::MaxDepthOversized;
        }
    }

    pub fn is_fetchable(&self) -> bool {
        self.status == PartitionStatus::Fetchable
    }
}
