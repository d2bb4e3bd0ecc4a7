//! Response cache.
//!
//! - **Store**: [`CacheStore`] over Redis, or an in-process LRU when no Redis URL is set
//! - **Keys**: `<prefix>:<path>:<digest>` derived from the path and canonical query
//! - **Middleware**: read-through for GET, invalidation after successful writes
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! redis_url = "redis://127.0.0.1:6379/"
//! ttl_seconds = 60
//! ```

mod config;
mod invalidation;
mod keys;
mod middleware;
mod pattern;
mod redis_store;
mod store;

pub use config::{Backoff, CacheConfig};
pub use invalidation::{CacheInvalidator, invalidate_on_write};
pub use keys::{canonical_query, derive_key};
pub use middleware::{CACHE_STATUS_HEADER, CacheState, response_cache_layer};
pub use pattern::{escape_glob, glob_match};
pub use redis_store::RedisStore;
pub use store::{CacheError, CacheStore, ConnectionState, ConnectionStateCell, MemoryStore};

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Build the configured store and connect it. A store that cannot connect is
/// still returned; the cache then stays bypassed until the backend recovers.
pub async fn connect_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let store = Arc::new(RedisStore::new(url, config)?);
            if let Err(err) = store.connect().await {
                warn!(
                    target = "ledgerdesk::cache",
                    error = %err,
                    "cache store unavailable; serving uncached"
                );
            }
            store.spawn_health_probe(HEALTH_PROBE_INTERVAL);
            Ok(store)
        }
        None => {
            let store = Arc::new(MemoryStore::new(config));
            store.connect().await?;
            info!(
                target = "ledgerdesk::cache",
                entries = config.memory_entry_limit,
                "using in-memory cache store"
            );
            Ok(store)
        }
    }
}
