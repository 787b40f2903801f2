//! Store client errors

use thiserror::Error;

/// Errors that can occur when interacting with the key-value store API
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store API returned an error
    #[error("Store API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The `If-Match` ETag no longer matches the store
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    /// Returns true for a 404 from the API.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Returns true for a 412 from the API.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed(_))
    }
}
