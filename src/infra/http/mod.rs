pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRef, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::application::error::ErrorReport;
use crate::application::repos::{HealthRepo, RepoError};
use crate::cache::CacheState;

#[derive(Clone)]
pub struct RouterState {
    pub api: ApiState,
    pub cache: CacheState,
    pub health: Arc<dyn HealthRepo>,
    pub request_body_limit: usize,
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

impl FromRef<RouterState> for CacheState {
    fn from_ref(state: &RouterState) -> Self {
        state.cache.clone()
    }
}

impl FromRef<RouterState> for Arc<dyn HealthRepo> {
    fn from_ref(state: &RouterState) -> Self {
        state.health.clone()
    }
}

/// Full application router: `/health` plus the authenticated API.
pub fn build_router(state: RouterState) -> Router {
    let api = build_api_router(state.api.clone(), state.cache.clone());

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.request_body_limit))
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .with_state(state)
}

async fn health(State(repo): State<Arc<dyn HealthRepo>>) -> Response {
    db_health_response(repo.ping().await)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
