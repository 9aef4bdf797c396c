//! Error types for the Reddit client.

use thiserror::Error;

/// Errors that can occur when interacting with Reddit.
#[derive(Debug, Error)]
pub enum RedditError {
    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status from the API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The submission endpoint accepted the request but reported errors
    /// in its `json.errors` envelope.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// Submission not found.
    #[error("submission not found: {0}")]
    NotFound(String),

    /// Rate limited.
    #[error("rate limited{}", match (endpoint, retry_after_secs) {
        (Some(ep), Some(secs)) => format!(" on {} (retry after {}s)", ep, secs),
        (Some(ep), None) => format!(" on {}", ep),
        (None, Some(secs)) => format!(" (retry after {}s)", secs),
        (None, None) => String::new(),
    })]
    RateLimited {
        /// The endpoint that was rate limited (optional).
        endpoint: Option<String>,
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
