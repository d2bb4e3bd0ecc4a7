//! JSON API under `/api`.

pub mod error;
mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

use crate::cache::{CacheState, invalidate_on_write, response_cache_layer};

pub use state::ApiState;

/// Requests pass auth first, then the invalidation gateway, then the
/// read-through cache.
pub fn build_api_router<S>(api: ApiState, cache: CacheState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/api/travel-data", post(handlers::create_travel_data))
        .route(
            "/api/travel-data/{id}",
            get(handlers::list_travel_data)
                .patch(handlers::update_travel_data)
                .delete(handlers::delete_travel_data),
        )
        .route(
            "/api/upload-sessions",
            get(handlers::list_upload_sessions).post(handlers::import_upload_session),
        )
        .route(
            "/api/upload-sessions/{id}",
            get(handlers::get_upload_session),
        )
        .with_state(api.clone())
        .layer(from_fn_with_state(cache.clone(), response_cache_layer))
        .layer(from_fn_with_state(cache, invalidate_on_write))
        .layer(from_fn_with_state(api, middleware::require_session))
}
