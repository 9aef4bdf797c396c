//! Herald: recurring discussion-thread manager for Reddit.
//!
//! Creates a daily discussion thread, tracks its lifecycle in a local SQLite
//! store, and replaces it once expired. A single invocation performs one pass
//! of the lifecycle state machine and exits; scheduling is left to an
//! external job runner (cron or similar), one invocation per period.

use clap::Parser;
use miette::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald_reddit::{Credentials, RedditClient};

use crate::controller::Settings;
use crate::store::{PostStore, StoreError};

mod controller;
mod store;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Recurring discussion-thread manager for Reddit", long_about = None)]
struct Args {
    /// OAuth2 client id of the script application
    #[arg(long, env = "REDDIT_CLIENT_ID")]
    client_id: String,

    /// OAuth2 client secret
    #[arg(long, env = "REDDIT_CLIENT_SECRET")]
    client_secret: String,

    /// Account username
    #[arg(long, env = "REDDIT_USERNAME")]
    username: String,

    /// Account password
    #[arg(long, env = "REDDIT_PASSWORD")]
    password: String,

    /// User agent sent on every request
    #[arg(long, env = "REDDIT_USER_AGENT")]
    user_agent: String,

    /// Target subreddit, without the r/ prefix
    #[arg(long, env = "REDDIT_SUBREDDIT")]
    subreddit: String,

    /// Flair template id applied to each new thread
    #[arg(long, env = "REDDIT_FLAIR_ID")]
    flair_id: String,

    /// Thread time-to-live in minutes
    #[arg(long, env = "REDDIT_TTL_MINS", default_value = "1440")]
    ttl_mins: i64,

    /// Timezone for the date embedded in thread titles
    #[arg(long, env = "LOCALE_TIMEZONE", default_value = "UTC")]
    timezone: chrono_tz::Tz,

    /// Path to the SQLite store
    #[arg(long, env = "SQLITE_DATABASE", default_value = "posts.db")]
    db: String,

    /// Abort instead of initializing when the store has no schema.
    /// Guards against operating on a wiped or corrupted store.
    #[arg(long, env = "SQLITE_FAILURE_STALL", value_parser = parse_bool_env, default_value = "false")]
    fail_stall: bool,

    /// Path to the thread body template, read fresh on every creation
    #[arg(long, env = "THREAD_TEMPLATE", default_value = "template.md")]
    template: std::path::PathBuf,

    /// Title prefix; the localized date is appended
    #[arg(long, env = "THREAD_TITLE_PREFIX", default_value = "Daily Discussion")]
    title_prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env when present; deployments configure through the environment
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "herald=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let store = match PostStore::open(&args.db, args.fail_stall) {
        Ok(store) => store,
        Err(e @ StoreError::SchemaMissing { .. }) => {
            error!(
                error = %e,
                "fail-stall enabled and store has no schema; disable fail-stall to initialize, or check storage"
            );
            return Err(miette::miette!("{}", e));
        }
        Err(e) => return Err(miette::miette!("{}", e)),
    };

    let client = RedditClient::new(Credentials {
        client_id: args.client_id,
        client_secret: args.client_secret,
        username: args.username,
        password: args.password,
        user_agent: args.user_agent,
    });

    client.login().await.map_err(|e| miette::miette!("{}", e))?;

    let settings = Settings {
        subreddit: args.subreddit,
        flair_template_id: args.flair_id,
        ttl_mins: args.ttl_mins,
        timezone: args.timezone,
        template_path: args.template,
        title_prefix: args.title_prefix,
        fail_stall: args.fail_stall,
    };

    controller::run_once(&store, &client, &settings)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    info!("run complete");
    Ok(())
}
