//! Reddit API client for Herald.
//!
//! Wraps the subset of the Reddit API that Herald needs: OAuth2
//! password-grant authentication, self-post submission, and the moderator
//! actions used to manage a recurring thread (sticky, flair, lock, remove).

mod client;
mod error;
mod types;

pub use client::{DEFAULT_API_URL, DEFAULT_AUTH_URL, RedditClient};
pub use error::RedditError;
pub use types::{Credentials, SubmissionInfo, SubmittedPost};
