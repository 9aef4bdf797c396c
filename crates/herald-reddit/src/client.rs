//! Reddit OAuth2 client implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Credentials, RedditError, SubmissionInfo, SubmittedPost};

/// Default endpoint for OAuth2 token exchange.
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com";

/// Default endpoint for authenticated API calls.
pub const DEFAULT_API_URL: &str = "https://oauth.reddit.com";

/// Client for interacting with the Reddit API as a script application.
pub struct RedditClient {
    http: Client,
    auth_url: String,
    api_url: String,
    credentials: Credentials,
    token: Arc<RwLock<Option<String>>>,
}

impl RedditClient {
    /// Create a new client against the official Reddit endpoints.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_endpoints(credentials, DEFAULT_AUTH_URL, DEFAULT_API_URL)
    }

    /// Create a client against custom endpoints (used in tests).
    pub fn with_endpoints(
        credentials: Credentials,
        auth_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            auth_url: auth_url.into(),
            api_url: api_url.into(),
            credentials,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Authenticate using the OAuth2 password grant.
    ///
    /// Reddit reports bad credentials as a 200 response carrying an `error`
    /// field, so both the status and the body are checked.
    pub async fn login(&self) -> Result<(), RedditError> {
        let url = format!("{}/api/v1/access_token", self.auth_url);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .header("User-Agent", &self.credentials.user_agent)
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.map_err(|e| {
                RedditError::Auth(format!(
                    "token request failed ({}): failed to read response: {}",
                    status, e
                ))
            })?;
            return Err(RedditError::Auth(format!(
                "token request failed ({}): {}",
                status, text
            )));
        }

        let body: TokenResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(RedditError::Auth(format!("token request rejected: {}", error)));
        }

        let access_token = body
            .access_token
            .ok_or_else(|| RedditError::InvalidResponse("token response missing access_token".into()))?;

        info!(
            username = %self.credentials.username,
            expires_in = ?body.expires_in,
            "authenticated with reddit"
        );

        *self.token.write().await = Some(access_token);
        Ok(())
    }

    /// Get the current access token.
    async fn access_token(&self) -> Result<String, RedditError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| RedditError::Auth("not authenticated".to_string()))
    }

    /// Submit a new self post to a subreddit.
    pub async fn submit(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
        send_replies: bool,
    ) -> Result<SubmittedPost, RedditError> {
        let response = self
            .post_form(
                "/api/submit",
                &[
                    ("api_type", "json".to_string()),
                    ("kind", "self".to_string()),
                    ("sr", subreddit.to_string()),
                    ("title", title.to_string()),
                    ("text", body.to_string()),
                    ("sendreplies", send_replies.to_string()),
                ],
            )
            .await?;

        let envelope: SubmitEnvelope = response.json().await?;

        if !envelope.json.errors.is_empty() {
            return Err(RedditError::Rejected(format_api_errors(&envelope.json.errors)));
        }

        let data = envelope
            .json
            .data
            .ok_or_else(|| RedditError::InvalidResponse("submit response missing data".into()))?;

        debug!(id = %data.id, url = %data.url, "submitted post");

        Ok(SubmittedPost {
            id: data.id,
            name: data.name,
            url: data.url,
        })
    }

    /// Fetch submission details, including the platform-reported creation time.
    pub async fn submission(&self, id: &str) -> Result<SubmissionInfo, RedditError> {
        let token = self.access_token().await?;
        let url = format!("{}/api/info", self.api_url);

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", &self.credentials.user_agent)
            .query(&[("id", fullname(id))])
            .send()
            .await?;

        let response = self.check_status("/api/info", response).await?;
        let listing: InfoListing = response.json().await?;

        let child = listing
            .data
            .children
            .into_iter()
            .next()
            .ok_or_else(|| RedditError::NotFound(id.to_string()))?;

        let created_utc = DateTime::from_timestamp(child.data.created_utc as i64, 0)
            .ok_or_else(|| {
                RedditError::InvalidResponse(format!(
                    "out-of-range created_utc: {}",
                    child.data.created_utc
                ))
            })?;

        Ok(SubmissionInfo {
            id: child.data.id,
            name: child.data.name,
            title: child.data.title,
            created_utc,
        })
    }

    /// Sticky a submission in its subreddit.
    pub async fn sticky(&self, id: &str) -> Result<(), RedditError> {
        self.post_form(
            "/api/set_subreddit_sticky",
            &[
                ("api_type", "json".to_string()),
                ("id", fullname(id)),
                ("state", "true".to_string()),
            ],
        )
        .await?;

        debug!(id = %id, "stickied post");
        Ok(())
    }

    /// Apply a flair template to a submission.
    pub async fn select_flair(
        &self,
        subreddit: &str,
        id: &str,
        flair_template_id: &str,
    ) -> Result<(), RedditError> {
        self.post_form(
            &format!("/r/{}/api/selectflair", subreddit),
            &[
                ("api_type", "json".to_string()),
                ("link", fullname(id)),
                ("flair_template_id", flair_template_id.to_string()),
            ],
        )
        .await?;

        debug!(id = %id, flair_template_id = %flair_template_id, "flaired post");
        Ok(())
    }

    /// Lock a submission, preventing further replies.
    pub async fn lock(&self, id: &str) -> Result<(), RedditError> {
        self.post_form("/api/lock", &[("id", fullname(id))]).await?;

        debug!(id = %id, "locked post");
        Ok(())
    }

    /// Remove a submission as a moderator action (not marked as spam).
    pub async fn remove(&self, id: &str) -> Result<(), RedditError> {
        self.post_form(
            "/api/remove",
            &[("id", fullname(id)), ("spam", "false".to_string())],
        )
        .await?;

        debug!(id = %id, "removed post");
        Ok(())
    }

    /// POST an authenticated form to the API host and check the status.
    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<reqwest::Response, RedditError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_url, endpoint);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", &self.credentials.user_agent)
            .form(form)
            .send()
            .await?;

        self.check_status(endpoint, response).await
    }

    /// Map non-success statuses to errors, passing successful responses through.
    async fn check_status(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RedditError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(RedditError::RateLimited {
                endpoint: Some(endpoint.to_string()),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let text = response.text().await.map_err(|e| {
                RedditError::InvalidResponse(format!(
                    "request failed ({}): failed to read response: {}",
                    status, e
                ))
            })?;
            return Err(RedditError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(response)
    }
}

/// Prefix a bare submission id with the link type (`t3_`).
fn fullname(id: &str) -> String {
    if id.starts_with("t3_") {
        id.to_string()
    } else {
        format!("t3_{}", id)
    }
}

/// Format the `json.errors` envelope into a readable message.
///
/// Each error is a tuple-like array, e.g. `["SUBREDDIT_NOTALLOWED",
/// "you aren't allowed to post there", "sr"]`.
fn format_api_errors(errors: &[Vec<serde_json::Value>]) -> String {
    errors
        .iter()
        .map(|e| {
            e.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(": ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// OAuth2 token response. Bad credentials arrive as `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Envelope returned by `api_type=json` endpoints.
#[derive(Debug, Deserialize)]
struct SubmitEnvelope {
    json: SubmitBody,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    id: String,
    name: String,
    url: String,
}

/// Listing returned by `/api/info`.
#[derive(Debug, Deserialize)]
struct InfoListing {
    data: InfoListingData,
}

#[derive(Debug, Deserialize)]
struct InfoListingData {
    children: Vec<InfoChild>,
}

#[derive(Debug, Deserialize)]
struct InfoChild {
    data: InfoChildData,
}

#[derive(Debug, Deserialize)]
struct InfoChildData {
    id: String,
    name: String,
    title: String,
    created_utc: f64,
}
