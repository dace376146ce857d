//! Typed errors for the harvester library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! credential failure apart from an unexpected API response.

use thiserror::Error;

/// Run-level failures. Any of these aborts a harvesting run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The API rejected our credentials. Requires an external refresh.
    #[error("authentication failed (status {status}), credentials must be refreshed: {message}")]
    Authentication { status: u16, message: String },

    /// The API answered with a structured error payload while fetching
    #[error("API error {kind} (status {status:?}): {message}")]
    Api {
        status: Option<u16>,
        kind: String,
        message: String,
    },

    /// The API answered with something we could not interpret
    #[error("unexpected API response: {0}")]
    UnexpectedResponse(String),

    /// A collaborator request failed in a way that could not be skipped
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl HarvestError {
    /// True for the credential/auth failure class.
    pub fn is_authentication(&self) -> bool {
        matches!(self, HarvestError::Authentication { .. })
    }
}

/// Errors returned by a single collaborator request (search, enumeration,
/// detail lookup).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request timed out
    #[error("timeout: {context}")]
    Timeout { context: String },

    /// Connection-level failure
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Structured API-level error (a payload carrying a `type` field, or a
    /// non-success status)
    #[error("API error {kind} (status {status:?}): {message}")]
    Api {
        status: Option<u16>,
        kind: String,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl TransportError {
    /// Timeouts and connection failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout { .. } | TransportError::Http(_))
    }

    /// Expired or rejected credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, TransportError::Api { status: Some(401), .. })
    }
}

impl From<TransportError> for HarvestError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Api {
                status: Some(401),
                message,
                ..
            } => HarvestError::Authentication {
                status: 401,
                message,
            },
            TransportError::Api {
                status,
                kind,
                message,
            } => HarvestError::Api {
                status,
                kind,
                message,
            },
            TransportError::Decode(reason) => HarvestError::UnexpectedResponse(reason),
            other => HarvestError::Transport(other),
        }
    }
}

/// Result type alias for harvesting operations.
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

/// Result type alias for collaborator requests.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
