//! Core types for the Reddit client.

use chrono::{DateTime, Utc};

/// Credentials for a script-type Reddit application.
///
/// Reddit requires a descriptive `user_agent` on every request; requests with
/// generic agents are heavily throttled.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

/// A freshly submitted self post, as reported by `/api/submit`.
///
/// The submit endpoint does not return the creation timestamp; fetch it
/// afterwards with [`crate::RedditClient::submission`].
#[derive(Debug, Clone)]
pub struct SubmittedPost {
    /// Bare submission id (e.g. `abc123`).
    pub id: String,
    /// Fullname (e.g. `t3_abc123`).
    pub name: String,
    /// Permalink URL.
    pub url: String,
}

/// Submission details from `/api/info`.
#[derive(Debug, Clone)]
pub struct SubmissionInfo {
    /// Bare submission id.
    pub id: String,
    /// Fullname.
    pub name: String,
    /// Title as it appears on the platform.
    pub title: String,
    /// Platform-reported creation time.
    pub created_utc: DateTime<Utc>,
}
