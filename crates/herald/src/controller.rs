//! Lifecycle controller: the expiry-driven state machine over pending posts.
//!
//! Evaluated once per invocation, strictly sequentially:
//!
//! 1. Seed a genesis post when the store is empty.
//! 2. Scan pending records and remove any past expiry.
//! 3. Create a replacement when no posts remain pending after the scan.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{error, info, warn};

use herald_reddit::{RedditClient, RedditError};

use crate::store::{PostRecord, PostStore, StoreError};

/// Safety margin subtracted from the configured TTL, so a run scheduled
/// before the true platform-imposed expiry catches the thread in time.
const EXPIRY_SAFETY_MARGIN_MINS: i64 = 10;

/// Errors that can occur during a controller run.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Record store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Platform error.
    #[error("platform error: {0}")]
    Platform(#[from] RedditError),

    /// The body template could not be read.
    #[error("failed to read template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Settings for a single controller run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Target subreddit, without the `r/` prefix.
    pub subreddit: String,
    /// Flair template applied to each new thread.
    pub flair_template_id: String,
    /// Thread time-to-live in minutes.
    pub ttl_mins: i64,
    /// Timezone used for the date in thread titles. Storage stays UTC.
    pub timezone: Tz,
    /// Body template, read fresh on every creation.
    pub template_path: PathBuf,
    /// Title prefix; the localized date is appended.
    pub title_prefix: String,
    /// Mirrors the store guard: when set, an empty store never seeds a
    /// genesis post. Startup already aborted in that configuration, so this
    /// branch is defensive redundancy.
    pub fail_stall: bool,
}

/// A freshly created thread as reported by the platform.
#[derive(Debug, Clone)]
pub struct CreatedThread {
    /// Platform-assigned identifier.
    pub id: String,
    /// Platform-reported creation time.
    pub created_at: DateTime<Utc>,
}

/// Platform operations the controller needs.
///
/// Implemented by [`RedditClient`]; tests substitute a fake.
#[async_trait]
pub trait Platform {
    /// Submit a new thread with reply notifications disabled.
    async fn submit_thread(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedThread, RedditError>;

    /// Pin the thread in its subreddit.
    async fn sticky_thread(&self, id: &str) -> Result<(), RedditError>;

    /// Apply the category flair.
    async fn flair_thread(
        &self,
        subreddit: &str,
        id: &str,
        flair_template_id: &str,
    ) -> Result<(), RedditError>;

    /// Lock the thread against further replies.
    async fn lock_thread(&self, id: &str) -> Result<(), RedditError>;

    /// Remove the thread from its subreddit.
    async fn remove_thread(&self, id: &str) -> Result<(), RedditError>;
}

#[async_trait]
impl Platform for RedditClient {
    async fn submit_thread(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedThread, RedditError> {
        let post = self.submit(subreddit, title, body, false).await?;
        // The submit response carries no timestamp; fetch the platform's view
        let info = self.submission(&post.id).await?;
        Ok(CreatedThread {
            id: post.id,
            created_at: info.created_utc,
        })
    }

    async fn sticky_thread(&self, id: &str) -> Result<(), RedditError> {
        self.sticky(id).await
    }

    async fn flair_thread(
        &self,
        subreddit: &str,
        id: &str,
        flair_template_id: &str,
    ) -> Result<(), RedditError> {
        self.select_flair(subreddit, id, flair_template_id).await
    }

    async fn lock_thread(&self, id: &str) -> Result<(), RedditError> {
        self.lock(id).await
    }

    async fn remove_thread(&self, id: &str) -> Result<(), RedditError> {
        self.remove(id).await
    }
}

/// Run one pass of the lifecycle state machine.
pub async fn run_once<P: Platform>(
    store: &PostStore,
    platform: &P,
    settings: &Settings,
) -> Result<(), ControllerError> {
    if store.record_count()? == 0 && !settings.fail_stall {
        warn!("store is empty, creating genesis post");
        create_post(store, platform, settings).await?;
    }

    let pending = store.list_pending()?;
    let mut remaining = pending.len();
    info!(count = remaining, "posts marked as pending");

    let now = Utc::now();
    for record in &pending {
        if now > record.expires_at {
            info!(id = %record.id, expires_at = %record.expires_at, "post expired, running removal");
            remove_post(store, platform, record).await?;
            // The attempt counts against the pending total even when the
            // platform removal failed; the record stays pending in the store
            // and the next invocation retries it.
            remaining -= 1;
        } else {
            info!(id = %record.id, expires_at = %record.expires_at, "post still active");
        }
    }

    if remaining == 0 {
        create_post(store, platform, settings).await?;
    }

    Ok(())
}

/// Create a new thread and record it as pending.
async fn create_post<P: Platform>(
    store: &PostStore,
    platform: &P,
    settings: &Settings,
) -> Result<(), ControllerError> {
    let local_date = Utc::now().with_timezone(&settings.timezone);
    let title = format!(
        "{}: {}",
        settings.title_prefix,
        local_date.format("%b %d, %Y")
    );
    info!(title = %title, "creating new thread");

    // Read fresh each time so template edits apply without redeploying
    let body = tokio::fs::read_to_string(&settings.template_path)
        .await
        .map_err(|source| ControllerError::Template {
            path: settings.template_path.display().to_string(),
            source,
        })?;

    let thread = platform
        .submit_thread(&settings.subreddit, &title, &body)
        .await?;

    // Sticky and flair are best-effort: the thread exists either way and
    // must be recorded, or the next run would duplicate it
    if let Err(e) = platform.sticky_thread(&thread.id).await {
        warn!(id = %thread.id, error = %e, "failed to sticky thread");
    }
    if let Err(e) = platform
        .flair_thread(&settings.subreddit, &thread.id, &settings.flair_template_id)
        .await
    {
        warn!(id = %thread.id, error = %e, "failed to flair thread");
    }

    let expires_at =
        thread.created_at + Duration::minutes(settings.ttl_mins - EXPIRY_SAFETY_MARGIN_MINS);

    store.insert(&PostRecord {
        id: thread.id.clone(),
        posted_at: thread.created_at,
        expires_at,
        completed: false,
    })?;

    info!(id = %thread.id, expires_at = %expires_at, "recorded new thread");
    Ok(())
}

/// Lock and remove an expired thread, marking the record completed on success.
///
/// A failed removal leaves the record pending with its expiry untouched; it
/// is retried on every subsequent invocation, without cap or backoff.
async fn remove_post<P: Platform>(
    store: &PostStore,
    platform: &P,
    record: &PostRecord,
) -> Result<(), ControllerError> {
    // Lock first so no replies land while removal is in flight. Lock
    // failures propagate: the thread is still intact and the record pending.
    platform.lock_thread(&record.id).await?;

    match platform.remove_thread(&record.id).await {
        Ok(()) => {
            store.mark_completed(&record.id)?;
            info!(id = %record.id, "removed expired thread");
        }
        Err(e) => {
            error!(id = %record.id, error = %e, "failed to remove expired thread, leaving record pending");
        }
    }

    Ok(())
}
