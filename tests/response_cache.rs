mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;

use ledgerdesk::cache::{
    CacheConfig, CacheState, CacheStore, MemoryStore, RedisStore, response_cache_layer,
};
use ledgerdesk::domain::users::{UserRole, UserStatus};

use support::{TestApp, cache_status, json_body};

#[derive(Clone)]
struct Counter(Arc<AtomicUsize>);

async fn counted(State(counter): State<Counter>) -> Json<Value> {
    let calls = counter.0.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "calls": calls }))
}

async fn counted_router(config: CacheConfig) -> (Router, Arc<AtomicUsize>) {
    let store = Arc::new(MemoryStore::new(&config));
    store.connect().await.expect("memory store connects");
    let calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/items", get(counted).post(counted))
        .with_state(Counter(calls.clone()))
        .layer(from_fn_with_state(
            CacheState::new(config, store),
            response_cache_layer,
        ));
    (router, calls)
}

async fn call(router: &Router, method: Method, uri: &str) -> axum::http::Response<Body> {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    response
}

#[tokio::test(start_paused = true)]
async fn repeated_get_runs_handler_once_until_ttl_expires() {
    let (router, calls) = counted_router(CacheConfig::default()).await;

    let first = call(&router, Method::GET, "/items").await;
    assert_eq!(cache_status(&first).as_deref(), Some("MISS"));
    let second = call(&router, Method::GET, "/items").await;
    assert_eq!(cache_status(&second).as_deref(), Some("HIT"));
    assert_eq!(
        second.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(json_body(second).await, json!({ "calls": 1 }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    let third = call(&router, Method::GET, "/items").await;
    assert_eq!(cache_status(&third).as_deref(), Some("MISS"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn query_order_does_not_split_entries() {
    let (router, calls) = counted_router(CacheConfig::default()).await;

    call(&router, Method::GET, "/items?a=1&b=2").await;
    let reordered = call(&router, Method::GET, "/items?b=2&a=1").await;
    assert_eq!(cache_status(&reordered).as_deref(), Some("HIT"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    call(&router, Method::GET, "/items?a=1&b=3").await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_get_requests_pass_through() {
    let (router, calls) = counted_router(CacheConfig::default()).await;

    for _ in 0..2 {
        let response = call(&router, Method::POST, "/items").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(cache_status(&response), None);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabled_cache_never_stores() {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    let (router, calls) = counted_router(config).await;

    call(&router, Method::GET, "/items").await;
    let second = call(&router, Method::GET, "/items").await;
    assert_eq!(cache_status(&second), None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_redis_never_fails_requests() {
    let config = CacheConfig {
        redis_url: Some("redis://127.0.0.1:1/".to_string()),
        connect_max_retries: 0,
        ..CacheConfig::default()
    };
    let store = Arc::new(RedisStore::new("redis://127.0.0.1:1/", &config).unwrap());
    assert!(store.connect().await.is_err());
    assert!(!store.is_connected());

    let app = TestApp::with_store(config, store, true);
    let (_, token) = app.users.login(UserRole::User, UserStatus::Active).await;

    let created = app
        .send(
            Method::POST,
            "/api/travel-data",
            Some(&token),
            Some(json!({ "session_id": "offline", "voucher": "V1" })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    for _ in 0..2 {
        let listed = app
            .send(Method::GET, "/api/travel-data/offline", Some(&token), None)
            .await;
        assert_eq!(listed.status(), StatusCode::OK);
        assert_eq!(cache_status(&listed), None);
        assert_eq!(json_body(listed).await["total"], 1);
    }
    assert_eq!(app.travel_data.list_calls.load(Ordering::SeqCst), 2);
    assert!(app.store.get("cache:/api/travel-data/offline:00000000").await.is_none());
}
