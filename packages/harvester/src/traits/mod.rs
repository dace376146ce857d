//! Collaborator seams.
//!
//! The engine only talks to the outside world through these traits:
//! searching, enumerating child filter values, fetching detail documents
//! and writing records.

pub mod detail;
pub mod enumerator;
pub mod store;
pub mod transport;
