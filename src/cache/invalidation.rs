//! Pattern-based cache invalidation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::info;

use super::{CacheState, CacheStore};

const METRIC_INVALIDATED: &str = "ledgerdesk_cache_invalidated_total";

#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
    epoch: Arc<AtomicU64>,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of invalidations started so far. A response read under one
    /// epoch must not be stored once the epoch has moved on.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Delete every entry whose key matches the glob `pattern`.
    ///
    /// The epoch advances before the delete starts.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.delete_matching(pattern).await;
        counter!(METRIC_INVALIDATED).increment(removed);
        info!(
            target = "ledgerdesk::cache::invalidation",
            pattern,
            removed,
            "cache entries invalidated"
        );
        removed
    }
}

/// Drop cached travel-data and upload-session responses after a successful write.
pub async fn invalidate_on_write(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_write = matches!(
        *request.method(),
        Method::POST | Method::PATCH | Method::PUT | Method::DELETE
    );
    let response = next.run(request).await;

    if is_write && response.status().is_success() {
        for pattern in cache.config.write_invalidation_patterns() {
            cache.invalidator.invalidate(&pattern).await;
        }
    }
    response
}
