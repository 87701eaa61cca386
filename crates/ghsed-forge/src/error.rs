//! Error types for ghsed-forge

use thiserror::Error;

/// Errors that can occur while talking to a code forge
#[derive(Error, Debug)]
pub enum ForgeError {
    /// The requested resource (branch, blob, repository, ...) does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The forge answered with a non-success status
    #[error("Forge API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The forge answered with a payload we could not decode
    #[error("Failed to decode forge response: {0}")]
    Decode(String),

    /// A repository name that is not of the form `owner/name`
    #[error("Invalid repository name: {0}")]
    InvalidRepository(String),
}

impl ForgeError {
    /// Whether this error is the forge's not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ForgeError::NotFound { .. })
    }

    /// Whether the forge rejected the request as unprocessable (HTTP 422).
    pub fn is_unprocessable(&self) -> bool {
        matches!(self, ForgeError::Api { status: 422, .. })
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ForgeError::Decode(err.to_string())
        } else {
            ForgeError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::Decode(err.to_string())
    }
}
