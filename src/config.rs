//! Run configuration, read from the environment once at startup and passed
//! down explicitly.
use crate::util::env::{db_url, env_flag, env_list, env_opt, env_parse};
use anyhow::Result;
use std::time::Duration;

pub const DEFAULT_STEAM_API_ADDRESS: &str = "https://api.steampowered.com";
pub const DEFAULT_STEAM_STORE_ADDRESS: &str = "https://store.steampowered.com";

/// Remote catalog endpoints and HTTP behaviour.
#[derive(Debug, Clone)]
pub struct SteamConfig {
    pub api_address: String,
    pub store_address: String,
    pub timeout: Duration,
    /// Sleep ladder used when Steam answers 429.
    pub rate_limit_delays: Vec<Duration>,
}

impl Default for SteamConfig {
    fn default() -> Self {
        Self {
            api_address: DEFAULT_STEAM_API_ADDRESS.to_string(),
            store_address: DEFAULT_STEAM_STORE_ADDRESS.to_string(),
            timeout: Duration::from_secs(15),
            rate_limit_delays: [5u64, 10, 15, 20]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

/// Bounds for resubmitting unprocessed batch items.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Submissions per chunk, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before resubmission number `attempt` (1-based), doubling from
    /// `base_delay` and capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub table: String,
    pub auto_migrate: bool,
    pub run_lock: bool,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub steam: SteamConfig,
    pub retry: RetryPolicy,
    /// Detail lookups in flight at once; 1 means strictly sequential.
    pub classify_concurrency: usize,
    pub store: StoreConfig,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        let steam_defaults = SteamConfig::default();
        let steam = SteamConfig {
            api_address: env_opt("STEAM_API_ADDRESS")
                .unwrap_or(steam_defaults.api_address)
                .trim_end_matches('/')
                .to_string(),
            store_address: env_opt("STEAM_STORE_ADDRESS")
                .unwrap_or(steam_defaults.store_address)
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(env_parse("STEAM_HTTP_TIMEOUT_SECS", 15u64)),
            rate_limit_delays: env_list::<u64>("STEAM_RATE_LIMIT_DELAYS")
                .map(|v| v.into_iter().map(Duration::from_secs).collect())
                .unwrap_or(steam_defaults.rate_limit_delays),
        };

        let retry = RetryPolicy {
            max_attempts: env_parse("PERSIST_MAX_ATTEMPTS", 8u32).max(1),
            base_delay: Duration::from_millis(env_parse("PERSIST_BACKOFF_BASE_MS", 100u64)),
            max_delay: Duration::from_millis(env_parse("PERSIST_BACKOFF_MAX_MS", 5_000u64)),
        };

        let store = StoreConfig {
            database_url: db_url()?,
            max_connections: env_parse("DB_MAX_CONNS", 5u32),
            table: env_opt("CATALOG_TABLE").unwrap_or_else(|| "games".into()),
            auto_migrate: env_flag("AUTO_MIGRATE", false),
            run_lock: env_flag("SYNC_RUN_LOCK", true),
        };

        Ok(Self {
            steam,
            retry,
            classify_concurrency: env_parse("CLASSIFY_CONCURRENCY", 4usize).max(1),
            store,
        })
    }
}
