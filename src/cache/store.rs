//! Key-value store behind the response cache.
//!
//! Every data operation fails soft: an unreachable backend reads as a miss,
//! a failed write is logged and dropped, and a failed delete removes nothing.

use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use super::config::CacheConfig;
use super::pattern::glob_match;
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unreachable after {attempts} attempts: {message}")]
    ConnectionFailed { attempts: u32, message: String },
    #[error("invalid cache url: {0}")]
    InvalidUrl(String),
    #[error("cache operation failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Connected => 0,
            Self::Reconnecting => 1,
            Self::Disconnected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connected,
            1 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free connection state that logs every transition.
#[derive(Debug)]
pub struct ConnectionStateCell {
    backend: &'static str,
    state: AtomicU8,
}

impl ConnectionStateCell {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Store `next`; returns true when the state changed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let previous = ConnectionState::from_u8(self.state.swap(next.as_u8(), Ordering::AcqRel));
        if previous == next {
            return false;
        }
        match next {
            ConnectionState::Connected => info!(
                target = "ledgerdesk::cache::store",
                backend = self.backend,
                from = %previous,
                "cache store connected"
            ),
            _ => warn!(
                target = "ledgerdesk::cache::store",
                backend = self.backend,
                from = %previous,
                to = %next,
                "cache store connection state changed"
            ),
        }
        true
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Establish the connection, retrying with backoff.
    async fn connect(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Option<String>;

    /// Returns false when the value could not be stored.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Remove every key matching the glob `pattern`; returns how many were removed.
    async fn delete_matching(&self, pattern: &str) -> u64;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    async fn close(&self);
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local LRU store with per-entry expiry.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, MemoryEntry>>,
    state: ConnectionStateCell,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_entry_limit_non_zero())),
            state: ConnectionStateCell::new("memory"),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn connect(&self) -> Result<(), CacheError> {
        self.state.transition(ConnectionState::Connected);
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> bool {
        if !self.is_connected() {
            return false;
        }
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set_with_ttl").put(key.to_string(), entry);
        true
    }

    async fn delete_matching(&self, pattern: &str) -> u64 {
        let mut entries = rw_write(&self.entries, SOURCE, "delete_matching");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len() as u64
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn close(&self) {
        rw_write(&self.entries, SOURCE, "close").clear();
        self.state.transition(ConnectionState::Disconnected);
    }
}
