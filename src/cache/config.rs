//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_KEY_PREFIX: &str = "cache";
const DEFAULT_CONNECT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_BASE_MS: u64 = 100;
const DEFAULT_BACKOFF_CEILING_MS: u64 = 3000;
const DEFAULT_MEMORY_ENTRY_LIMIT: usize = 1000;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve and store GET responses.
    pub enabled: bool,
    /// Redis URL; the in-memory store is used when absent.
    pub redis_url: Option<String>,
    /// Lifetime of a stored response.
    pub ttl_seconds: u64,
    /// Leading segment of every response key.
    pub key_prefix: String,
    /// Connection attempts after the first before giving up.
    pub connect_max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    /// Capacity of the in-memory store.
    pub memory_entry_limit: usize,
    /// Responses larger than this are passed through uncached.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_max_retries: DEFAULT_CONNECT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_ceiling_ms: DEFAULT_BACKOFF_CEILING_MS,
            memory_entry_limit: DEFAULT_MEMORY_ENTRY_LIMIT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            redis_url: settings
                .redis_url
                .as_ref()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            ttl_seconds: settings.ttl_seconds,
            key_prefix: settings.key_prefix.clone(),
            connect_max_retries: settings.connect_max_retries,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_ceiling_ms: settings.backoff_ceiling_ms,
            memory_entry_limit: settings.memory_entry_limit,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl CacheConfig {
    /// Returns the memory entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.backoff_base_ms),
            ceiling: Duration::from_millis(self.backoff_ceiling_ms),
            max_retries: self.connect_max_retries,
        }
    }

    /// Pattern covering every cached travel-data response.
    pub fn travel_data_pattern(&self) -> String {
        format!("{}:/api/travel-data/*", self.key_prefix)
    }

    /// Pattern covering the upload-session list and single-session responses.
    pub fn upload_sessions_pattern(&self) -> String {
        format!("{}:/api/upload-sessions*", self.key_prefix)
    }

    /// Everything a successful write may have made stale.
    pub fn write_invalidation_patterns(&self) -> [String; 2] {
        [self.travel_data_pattern(), self.upload_sessions_pattern()]
    }
}

/// Exponential reconnect schedule: `base * 2^attempt`, capped at `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub ceiling: Duration,
    pub max_retries: u32,
}

impl Backoff {
    /// Delay before retry `attempt` (0-based), or `None` once retries are exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.ceiling))
    }
}
