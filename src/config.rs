//! Runtime configuration from environment variables.
//!
//! Every knob has a default; a blank value counts as unset. Feeds are
//! configured as comma-separated `id=url` pairs so one variable can
//! carry a whole adapter list.

use std::time::Duration;

pub const ENV_DB_PATH: &str = "CLAIMWATCH_DB_PATH";
pub const ENV_BIND_ADDR: &str = "CLAIMWATCH_BIND_ADDR";
pub const ENV_CRON_SECRET: &str = "CLAIMWATCH_CRON_SECRET";
pub const ENV_LOCK_TTL_SECS: &str = "CLAIMWATCH_LOCK_TTL_SECS";
pub const ENV_INGEST_INTERVAL_SECS: &str = "CLAIMWATCH_INGEST_INTERVAL_SECS";
pub const ENV_CHANGELOG_FEEDS: &str = "CLAIMWATCH_CHANGELOG_FEEDS";
pub const ENV_MAKER_FEEDS: &str = "CLAIMWATCH_MAKER_FEEDS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub bind_addr: String,
    /// `None` leaves the trigger endpoints unprotected (allowed, with a
    /// warning on every request), never denied.
    pub cron_secret: Option<String>,
    /// Must comfortably exceed the longest plausible ingest run; a run
    /// that outlives its TTL can be overlapped by the next trigger.
    pub lock_ttl: Duration,
    /// `None` disables the background scheduler; runs then happen only
    /// through external triggers.
    pub ingest_interval: Option<Duration>,
    pub changelog_feeds: Vec<FeedSpec>,
    pub maker_feeds: Vec<FeedSpec>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let lock_ttl_secs = env_u64(ENV_LOCK_TTL_SECS).unwrap_or(900);
        let ingest_interval = env_u64(ENV_INGEST_INTERVAL_SECS)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            database_path: env_trimmed(ENV_DB_PATH)
                .unwrap_or_else(|| "claimwatch.db".to_string()),
            bind_addr: env_trimmed(ENV_BIND_ADDR)
                .unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            cron_secret: env_trimmed(ENV_CRON_SECRET),
            lock_ttl: Duration::from_secs(lock_ttl_secs),
            ingest_interval,
            changelog_feeds: parse_feed_list(
                &env_trimmed(ENV_CHANGELOG_FEEDS).unwrap_or_default(),
            ),
            maker_feeds: parse_feed_list(&env_trimmed(ENV_MAKER_FEEDS).unwrap_or_default()),
        }
    }
}

/// Env value with whitespace trimmed; empty counts as unset.
fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = env_trimmed(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "config", key, value = %raw, "not an integer, using default");
            None
        }
    }
}

/// Parses a `id=url,id=url` list. The split is on the first `=`, so
/// query strings in the url survive. Malformed entries are skipped with
/// a warning rather than failing startup.
pub fn parse_feed_list(raw: &str) -> Vec<FeedSpec> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once('=') {
            Some((id, url)) if !id.trim().is_empty() && !url.trim().is_empty() => {
                out.push(FeedSpec {
                    id: id.trim().to_string(),
                    url: url.trim().to_string(),
                });
            }
            _ => {
                tracing::warn!(target: "config", entry, "feed entry is not id=url, skipped");
            }
        }
    }
    out
}
