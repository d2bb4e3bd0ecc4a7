mod support;

use std::sync::Arc;

use axum::http::Method;
use serde_json::json;

use ledgerdesk::client::{
    FileSessionStorage, HttpTravelDataSource, LoadOutcome, SessionDataStore, SessionIdStorage,
};
use ledgerdesk::domain::users::{UserRole, UserStatus};

use support::{TestApp, json_body};

async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("server");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn store_loads_and_reflects_confirmed_writes() {
    let app = TestApp::new().await;
    let (_, token) = app.users.login(UserRole::User, UserStatus::Active).await;
    for voucher in ["V1", "V2"] {
        app.send(
            Method::POST,
            "/api/travel-data",
            Some(&token),
            Some(json!({ "session_id": "desk", "voucher": voucher })),
        )
        .await;
    }
    let base = serve(&app).await;

    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(FileSessionStorage::new(dir.path()));
    storage.store(Some("desk")).unwrap();

    let source = Arc::new(HttpTravelDataSource::new(&base, token.clone()).unwrap());
    let store = Arc::new(SessionDataStore::open(source.clone(), storage.clone()).unwrap());
    assert_eq!(store.session_id().as_deref(), Some("desk"));

    let outcome = store.spawn_initial_load().wait().await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded(2));
    assert_eq!(store.items()[0].voucher, "V2");

    let created = source
        .create(&json!({ "session_id": "desk", "voucher": "V3" }))
        .await
        .unwrap();
    store.add_item(created.clone());

    let updated = source
        .update(created.id, &json!({ "pnr": "NEW123" }))
        .await
        .unwrap();
    assert!(store.update_item(updated));
    assert_eq!(store.items()[0].pnr, "NEW123");

    source.delete(created.id).await.unwrap();
    assert!(store.remove_item(created.id));
    assert_eq!(store.load_if_empty().await.unwrap(), LoadOutcome::AlreadyLoaded);

    let server_view = json_body(
        app.send(Method::GET, "/api/travel-data/desk", Some(&token), None)
            .await,
    )
    .await;
    assert_eq!(server_view["total"], 2);
    assert_eq!(store.refetch().await.unwrap(), LoadOutcome::Loaded(2));

    store.set_session_id(None).unwrap();
    assert!(store.items().is_empty());
    assert_eq!(storage.load().unwrap(), None);
}

#[tokio::test]
async fn server_errors_surface_their_message() {
    let app = TestApp::new().await;
    let base = serve(&app).await;

    let source = HttpTravelDataSource::new(&base, "ts_bogus_token").unwrap();
    let err = source
        .delete(uuid::Uuid::new_v4())
        .await
        .expect_err("unauthenticated");
    match err {
        ledgerdesk::client::ClientError::Server { status, message } => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(message, "Authentication required");
        }
        other => panic!("unexpected error: {other}"),
    }
}
