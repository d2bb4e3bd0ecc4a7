//! Redis-backed cache store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use redis::{
    Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::{Backoff, CacheConfig};
use super::store::{CacheError, CacheStore, ConnectionState, ConnectionStateCell};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::redis";
const SCAN_BATCH: usize = 200;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const METRIC_BACKEND_ERRORS: &str = "ledgerdesk_cache_backend_error_total";

pub struct RedisStore {
    client: Client,
    manager: RwLock<Option<ConnectionManager>>,
    state: ConnectionStateCell,
    backoff: Backoff,
    closed: AtomicBool,
}

impl RedisStore {
    pub fn new(url: &str, config: &CacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|err| CacheError::InvalidUrl(err.to_string()))?;
        Ok(Self {
            client,
            manager: RwLock::new(None),
            state: ConnectionStateCell::new("redis"),
            backoff: config.backoff(),
            closed: AtomicBool::new(false),
        })
    }

    async fn open_manager(&self) -> Result<ConnectionManager, RedisError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(CONNECT_TIMEOUT);
        self.client.get_connection_manager_with_config(config).await
    }

    /// Clone of the live manager. The lock is released before any await.
    fn connection(&self) -> Option<ConnectionManager> {
        rw_read(&self.manager, SOURCE, "connection").clone()
    }

    fn record_success(&self) {
        self.state.transition(ConnectionState::Connected);
    }

    fn record_failure(&self, op: &'static str, err: &RedisError) {
        counter!(METRIC_BACKEND_ERRORS, "op" => op).increment(1);
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            self.state.transition(ConnectionState::Reconnecting);
        }
        warn!(
            target = "ledgerdesk::cache::redis",
            op,
            error = %err,
            "cache operation failed"
        );
    }

    async fn ping(&self) -> Result<(), RedisError> {
        match self.connection() {
            Some(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map(|_| ()),
            None => {
                let manager = self.open_manager().await?;
                *rw_write(&self.manager, SOURCE, "ping.reopen") = Some(manager);
                Ok(())
            }
        }
    }

    /// Periodically PING so the state recovers from `Reconnecting` without traffic.
    pub fn spawn_health_probe(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if store.closed.load(Ordering::Acquire) {
                    break;
                }
                match store.ping().await {
                    Ok(()) => store.record_success(),
                    Err(err) => store.record_failure("ping", &err),
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn connect(&self) -> Result<(), CacheError> {
        let mut attempt = 0u32;
        loop {
            match self.open_manager().await {
                Ok(manager) => {
                    *rw_write(&self.manager, SOURCE, "connect") = Some(manager);
                    self.record_success();
                    return Ok(());
                }
                Err(err) => match self.backoff.delay(attempt) {
                    Some(delay) => {
                        self.state.transition(ConnectionState::Reconnecting);
                        warn!(
                            target = "ledgerdesk::cache::redis",
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "cache connection failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        self.state.transition(ConnectionState::Disconnected);
                        return Err(CacheError::ConnectionFailed {
                            attempts: attempt + 1,
                            message: err.to_string(),
                        });
                    }
                },
            }
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection()?;
        match redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(value) => {
                self.record_success();
                value
            }
            Err(err) => {
                self.record_failure("get", &err);
                None
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(mut conn) = self.connection() else {
            return false;
        };
        let seconds = ttl.as_secs().max(1);
        match redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async::<()>(&mut conn)
            .await
        {
            Ok(()) => {
                self.record_success();
                true
            }
            Err(err) => {
                self.record_failure("set", &err);
                false
            }
        }
    }

    async fn delete_matching(&self, pattern: &str) -> u64 {
        let Some(mut conn) = self.connection() else {
            return 0;
        };

        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    self.record_failure("scan", &err);
                    return removed;
                }
            };

            if !keys.is_empty() {
                match redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<u64>(&mut conn)
                    .await
                {
                    Ok(count) => removed += count,
                    Err(err) => {
                        self.record_failure("del", &err);
                        return removed;
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        self.record_success();
        debug!(
            target = "ledgerdesk::cache::redis",
            pattern,
            removed,
            "deleted matching keys"
        );
        removed
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        rw_write(&self.manager, SOURCE, "close").take();
        self.state.transition(ConnectionState::Disconnected);
    }
}
