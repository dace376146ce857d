//! Collaborator implementations talking to the remote search API.

pub mod http;
pub mod rate_limited;

pub use http::{HttpTransport, HttpTransportConfig};
pub use rate_limited::{RateLimitedTransport, RateLimitedTransportBuilder};
