//! Data types: partitions, fetch windows, records, configuration and run
//! summaries.

pub mod config;
pub mod partition;
pub mod record;
pub mod summary;
pub mod window;
