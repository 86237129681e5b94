use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::fetch::{FetchClient, FetchPolicy};
use crate::http_client::{DEFAULT_USER_AGENT, ReqwestTransport};
use crate::model::SourceKind;
use crate::sources::SourceUrls;

const CACHE_DIR: &str = "hoops_ingest";
const DB_FILE: &str = "hoops.sqlite";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub db_path: Option<PathBuf>,
    pub urls: SourceUrls,
    pub schedule_api_key: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub backfill_item_delay: Duration,
    pub stats_policy: FetchPolicy,
    pub schedule_policy: FetchPolicy,
    pub reference_policy: FetchPolicy,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = SourceUrls::default();
        let urls = SourceUrls {
            stats_api: env_string("STATS_API_BASE_URL").unwrap_or(defaults.stats_api),
            schedule_api: env_string("SCHEDULE_API_BASE_URL").unwrap_or(defaults.schedule_api),
            reference_site: env_string("REFERENCE_BASE_URL").unwrap_or(defaults.reference_site),
        };
        let request_timeout = Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 30).clamp(5, 120));

        Self {
            db_path: env_string("HOOPS_DB_PATH")
                .map(PathBuf::from)
                .or_else(default_db_path),
            urls,
            schedule_api_key: env_string("SCHEDULE_API_KEY"),
            user_agent: env_string("HTTP_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            request_timeout,
            backfill_item_delay: Duration::from_millis(
                env_u64("BACKFILL_ITEM_DELAY_MS", 1_000).min(60_000),
            ),
            // Stats API publishes no limit; stay well under what it tolerates.
            stats_policy: policy_from_env("STATS", 30, 1_000, 1_000),
            // Free tier: 5 requests per minute.
            schedule_policy: policy_from_env("SCHEDULE", 4, 200, 500),
            // Reference site blocks above 20 requests per minute.
            reference_policy: policy_from_env("REFERENCE", 15, 600, 3_100),
        }
    }

    pub fn policy_for(&self, source: SourceKind) -> &FetchPolicy {
        match source {
            SourceKind::StatsApi => &self.stats_policy,
            SourceKind::ScheduleApi => &self.schedule_policy,
            SourceKind::ReferenceSite => &self.reference_policy,
        }
    }
}

/// One client per source, each owning its own limiter.
pub struct SourceClients {
    pub stats: FetchClient,
    pub schedule: FetchClient,
    pub reference: FetchClient,
}

impl SourceClients {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let build = |source: SourceKind| -> Result<FetchClient> {
            let transport = ReqwestTransport::new(config.request_timeout, &config.user_agent)?;
            Ok(FetchClient::new(
                source.as_str(),
                Box::new(transport),
                config.policy_for(source).clone(),
            ))
        };

        let stats = build(SourceKind::StatsApi)?
            .with_header("Referer", "https://www.nba.com/")
            .with_header("Origin", "https://www.nba.com")
            .with_header("Accept", "application/json, text/plain, */*");
        let mut schedule = build(SourceKind::ScheduleApi)?;
        if let Some(key) = config.schedule_api_key.as_deref() {
            schedule = schedule.with_header("Authorization", key);
        }
        let reference = build(SourceKind::ReferenceSite)?;

        Ok(Self {
            stats,
            schedule,
            reference,
        })
    }
}

/// `.env.local` wins over `.env`; neither overrides the real environment.
pub fn load_env_files() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn policy_from_env(prefix: &str, short: u32, long: u32, delay_ms: u64) -> FetchPolicy {
    let mut policy = FetchPolicy::polite(
        env_u64(&format!("{prefix}_SHORT_LIMIT"), short as u64).clamp(1, 600) as u32,
        env_u64(&format!("{prefix}_LONG_LIMIT"), long as u64).clamp(1, 36_000) as u32,
    );
    policy.max_attempts = env_u64(&format!("{prefix}_MAX_ATTEMPTS"), 4).clamp(1, 6) as u32;
    policy.base_backoff =
        Duration::from_millis(env_u64(&format!("{prefix}_BACKOFF_MS"), 2_000).clamp(100, 60_000));
    policy.request_delay =
        Duration::from_millis(env_u64(&format!("{prefix}_REQUEST_DELAY_MS"), delay_ms).min(60_000));
    policy
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
