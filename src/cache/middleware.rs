//! Read-through response cache middleware.
//!
//! Serves GET responses from the cache store and stores 200 JSON responses on a
//! miss. The store write runs on a detached task so the response never waits
//! for it. A body read before an invalidation that raced it is never left in
//! the store. Non-GET requests and a disconnected store pass straight through.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{CacheConfig, CacheInvalidator, CacheStore, keys::derive_key, pattern::escape_glob};
use crate::application::error::ErrorReport;
use crate::domain::users::Principal;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

const METRIC_HIT: &str = "ledgerdesk_cache_hit_total";
const METRIC_MISS: &str = "ledgerdesk_cache_miss_total";
const METRIC_STORE: &str = "ledgerdesk_cache_store_total";
const METRIC_STORE_FAILED: &str = "ledgerdesk_cache_store_failed_total";

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: Arc<CacheConfig>,
    pub store: Arc<dyn CacheStore>,
    pub invalidator: CacheInvalidator,
}

impl CacheState {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config: Arc::new(config),
            invalidator: CacheInvalidator::new(store.clone()),
            store,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_seconds)
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || request.method() != Method::GET || !cache.store.is_connected() {
        return next.run(request).await;
    }

    let scope = request
        .extensions()
        .get::<Principal>()
        .map(Principal::cache_scope);
    let key = derive_key(
        &cache.config.key_prefix,
        request.uri().path(),
        request.uri().query(),
        scope.as_deref(),
    );

    if let Some(body) = cache.store.get(&key).await {
        counter!(METRIC_HIT).increment(1);
        debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
        return cached_response(body);
    }

    counter!(METRIC_MISS).increment(1);
    debug!(cache = "response", outcome = "miss", key = %key, "cache miss, executing handler");

    let epoch = cache.invalidator.epoch();
    let response = next.run(request).await;
    if !is_cacheable(&response, cache.config.max_body_bytes) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, cache.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_message(
                "cache::middleware::response_cache_layer",
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to buffer response body: {err}"),
            )
            .attach(&mut response);
            return response;
        }
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        let store = cache.store.clone();
        let invalidator = cache.invalidator.clone();
        let ttl = cache.ttl();
        let value = text.to_string();
        tokio::spawn(async move {
            store_response(store.as_ref(), &invalidator, epoch, &key, &value, ttl).await;
        });
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Store `value` unless an invalidation started after the handler ran.
///
/// The epoch is checked again after the write: an invalidation that began in
/// between may already have finished its delete, so the entry is removed here.
async fn store_response(
    store: &dyn CacheStore,
    invalidator: &CacheInvalidator,
    epoch: u64,
    key: &str,
    value: &str,
    ttl: Duration,
) -> bool {
    if invalidator.epoch() != epoch {
        debug!(
            cache = "response",
            outcome = "stale",
            key = %key,
            "skipping store after invalidation"
        );
        return false;
    }
    if !store.set_with_ttl(key, value, ttl).await {
        counter!(METRIC_STORE_FAILED).increment(1);
        warn!(
            target = "ledgerdesk::cache::middleware",
            key = %key,
            "failed to store response in cache"
        );
        return false;
    }
    if invalidator.epoch() != epoch {
        store.delete_matching(&escape_glob(key)).await;
        debug!(
            cache = "response",
            outcome = "stale",
            key = %key,
            "dropped entry raced by invalidation"
        );
        return false;
    }
    counter!(METRIC_STORE).increment(1);
    true
}

fn is_cacheable(response: &Response, max_body_bytes: usize) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }
    let headers = response.headers();
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    let too_large = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_some_and(|len| len > max_body_bytes);
    is_json && !too_large
}

fn cached_response(body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    response
}
