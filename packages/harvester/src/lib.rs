//! Adaptive Query-Space Harvesting Library
//!
//! Harvests every record behind a search API that caps how many results a
//! single query can return. The query space is split along a fixed filter
//! hierarchy until each piece fits under the cap, then every piece is paged
//! through concurrently and merged into an idempotent record store.
//!
//! # Design Philosophy
//!
//! - Probe before fetching: one cheap request tells us whether to split
//! - Stage by stage: a level is fully probed before the next one starts
//! - Never silently drop coverage: gaps are reported, not swallowed
//! - Idempotent writes: re-running a harvest is always safe
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::{HarvestConfig, Harvester, MemoryStore};
//! use harvester::transports::{HttpTransport, HttpTransportConfig};
//!
//! let transport = HttpTransport::new(HttpTransportConfig::new(cookie))?;
//! let harvester = Harvester::new(transport, MemoryStore::new(), HarvestConfig::default())?;
//!
//! let summary = harvester.harvest().await?;
//! if summary.has_coverage_gaps() {
//!     eprintln!("{} partitions exceed the cap", summary.max_depth_oversized.len());
//! }
//!
//! let details = harvester.backfill().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (QueryTransport, Enumerator, DetailSource, RecordStore)
//! - [`types`] - Partitions, fetch windows, records, configuration, summaries
//! - [`pipeline`] - Worker pool, planner, fetcher, sink, backfill and the harvester
//! - [`transports`] - HTTP transport and rate limiting
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`testing`] - Mock transport for testing

pub mod error;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod transports;
pub mod types;

// Re-export main types at crate root
pub use error::{HarvestError, HarvestResult, TransportError, TransportResult};
pub use traits::{
    detail::DetailSource, enumerator::Enumerator, store::RecordStore, transport::QueryTransport,
};
pub use types::{
    config::HarvestConfig,
    partition::{FilterValue, Level, Partition, PartitionKey, PartitionStatus},
    record::{DetailOutcome, MissingDetail, Record, SearchItem, SearchPage, UpsertOutcome},
    summary::{HarvestSummary, SkippedPartition, TruncatedPartition},
    window::{FetchWindow, SortDirection},
};

pub use pipeline::{BackfillReport, Harvester, IngestReport, Plan, Planner, WorkerPool};

pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

pub use transports::{HttpTransport, HttpTransportConfig, RateLimitedTransport};

// Re-export testing utilities
pub use testing::{MockFailure, MockTransport};
