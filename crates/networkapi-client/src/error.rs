//! NetworkAPI client errors

use thiserror::Error;

/// Errors that can occur when interacting with NetworkAPI
#[derive(Debug, Error)]
pub enum NetworkApiError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// NetworkAPI answered with a non-success status
    #[error("NetworkAPI error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// XML encoding/decoding error (legacy endpoints)
    #[error("XML error: {0}")]
    Xml(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing id on update)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl NetworkApiError {
    /// True when the error only signals that the resource does not exist.
    ///
    /// Reconcilers branch on this to choose between create and update.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkApiError::NotFound(_))
    }
}
