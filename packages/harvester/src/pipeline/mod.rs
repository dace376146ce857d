//! The harvesting pipeline.
//!
//! ```text
//! regions ─► Planner (probe ─► enumerate, per level) ─► Fetcher ─► Sink ─► RecordStore
//!                                                                          │
//!                                              DetailSource ─► backfill ◄──┘
//! ```

pub mod backfill;
pub mod fetch;
pub mod harvest;
pub mod planner;
pub mod pool;
pub mod probe;
pub mod sink;

pub use backfill::{backfill, BackfillReport};
pub use fetch::{fetch_window, Fetcher};
pub use harvest::Harvester;
pub use planner::{Plan, Planner};
pub use pool::{with_retries, WorkerPool};
pub use probe::{probe, probe_all};
pub use sink::{ingest, IngestReport, Sink};
