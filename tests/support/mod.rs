#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, Response, header};
use serde_json::Value;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use ledgerdesk::application::auth::{SessionAuthService, issue_token};
use ledgerdesk::application::pagination::PageWindow;
use ledgerdesk::application::repos::{
    HealthRepo, RecordScope, RepoError, TravelDataPage, TravelDataRepo, UploadSessionsRepo,
    UserSessionsRepo,
};
use ledgerdesk::application::travel_data::TravelDataService;
use ledgerdesk::application::upload_sessions::UploadSessionService;
use ledgerdesk::cache::{CacheConfig, CacheState, CacheStore, MemoryStore};
use ledgerdesk::domain::travel_data::{NewTravelData, TravelDataPatch, TravelDataRecord};
use ledgerdesk::domain::upload_sessions::{NewUploadSession, UploadSessionRecord};
use ledgerdesk::domain::users::{UserRole, UserSessionRecord, UserStatus};
use ledgerdesk::infra::http::{ApiState, RouterState, build_router};

/// Next timestamp after `previous`, mirroring the `GREATEST(now(), updated_at + 1µs)`
/// the Postgres repository uses.
pub fn advance_timestamp(previous: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
    let floor = previous + TimeDuration::microseconds(1);
    if now > floor { now } else { floor }
}

#[derive(Default)]
pub struct MemoryTravelData {
    rows: Mutex<Vec<TravelDataRecord>>,
    clock: Mutex<Option<OffsetDateTime>>,
    pub list_calls: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryTravelData {
    /// Strictly increasing timestamps so creation order is unambiguous.
    async fn tick(&self) -> OffsetDateTime {
        let mut clock = self.clock.lock().await;
        let now = OffsetDateTime::now_utc();
        let next = match *clock {
            Some(previous) => advance_timestamp(previous, now),
            None => now,
        };
        *clock = Some(next);
        next
    }

    /// One batch, one timestamp, as a single multi-row INSERT stamps it.
    pub async fn insert_many(&self, records: Vec<NewTravelData>) -> usize {
        let count = records.len();
        let now = self.tick().await;
        let mut rows = self.rows.lock().await;
        for record in records {
            rows.push(record.into_record(now));
        }
        count
    }

    pub async fn all(&self) -> Vec<TravelDataRecord> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl TravelDataRepo for MemoryTravelData {
    async fn insert(&self, record: NewTravelData) -> Result<TravelDataRecord, RepoError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = self.tick().await;
        let record = record.into_record(now);
        self.rows.lock().await.push(record.clone());
        Ok(record)
    }

    async fn list_by_session(
        &self,
        session_id: &str,
        scope: RecordScope,
        window: PageWindow,
    ) -> Result<TravelDataPage, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // Position in `rows` stands in for the insertion sequence.
        let mut matching: Vec<_> = self
            .rows
            .lock()
            .await
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, row)| row.session_id.as_deref() == Some(session_id))
            .filter(|(_, row)| scope.allows(row.owner_id))
            .collect();
        matching.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b_seq.cmp(a_seq))
        });
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .map(|(_, row)| row)
            .skip(window.offset() as usize)
            .take(window.limit() as usize)
            .collect();
        Ok(TravelDataPage { items, total })
    }

    async fn update(
        &self,
        id: Uuid,
        scope: RecordScope,
        patch: &TravelDataPatch,
    ) -> Result<Option<TravelDataRecord>, RepoError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = self.tick().await;
        let mut rows = self.rows.lock().await;
        let Some(row) = rows
            .iter_mut()
            .find(|row| row.id == id && scope.allows(row.owner_id))
        else {
            return Ok(None);
        };
        patch.apply_to(row);
        row.updated_at = advance_timestamp(row.updated_at, now);
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: Uuid, scope: RecordScope) -> Result<bool, RepoError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| !(row.id == id && scope.allows(row.owner_id)));
        Ok(rows.len() != before)
    }
}

pub struct MemoryUploadSessions {
    sessions: Mutex<Vec<UploadSessionRecord>>,
    travel_data: Arc<MemoryTravelData>,
}

impl MemoryUploadSessions {
    pub fn new(travel_data: Arc<MemoryTravelData>) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            travel_data,
        }
    }
}

#[async_trait]
impl UploadSessionsRepo for MemoryUploadSessions {
    async fn create_with_records(
        &self,
        session: NewUploadSession,
        records: Vec<NewTravelData>,
    ) -> Result<UploadSessionRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let inserted = self.travel_data.insert_many(records).await;
        let record = UploadSessionRecord {
            id: session.id,
            filename: session.filename,
            opening_balance: session.opening_balance,
            total_records: inserted as i64,
            owner_id: session.owner_id,
            created_at: now,
            updated_at: now,
        };
        self.sessions.lock().await.push(record.clone());
        Ok(record)
    }

    async fn list_sessions(
        &self,
        scope: RecordScope,
    ) -> Result<Vec<UploadSessionRecord>, RepoError> {
        let mut sessions: Vec<_> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|session| scope.allows(session.owner_id))
            .cloned()
            .collect();
        sessions.reverse();
        Ok(sessions)
    }

    async fn find_session(
        &self,
        id: Uuid,
        scope: RecordScope,
    ) -> Result<Option<UploadSessionRecord>, RepoError> {
        Ok(self
            .sessions
            .lock()
            .await
            .iter()
            .find(|session| session.id == id && scope.allows(session.owner_id))
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryUserSessions {
    by_prefix: Mutex<HashMap<String, UserSessionRecord>>,
    /// Make lookups fail as if the database timed out.
    pub unavailable: AtomicBool,
}

impl MemoryUserSessions {
    /// Register a session for a new user and return its bearer token.
    pub async fn login(&self, role: UserRole, status: UserStatus) -> (Uuid, String) {
        self.login_with(role, status, TimeDuration::hours(1), None).await
    }

    pub async fn login_with(
        &self,
        role: UserRole,
        status: UserStatus,
        lifetime: TimeDuration,
        revoked_at: Option<OffsetDateTime>,
    ) -> (Uuid, String) {
        let issued = issue_token();
        let user_id = Uuid::new_v4();
        let record = UserSessionRecord {
            id: Uuid::new_v4(),
            prefix: issued.prefix.clone(),
            hashed_secret: issued.hashed_secret,
            expires_at: OffsetDateTime::now_utc() + lifetime,
            revoked_at,
            user_id,
            email: format!("{user_id}@example.test"),
            role,
            status,
        };
        self.by_prefix.lock().await.insert(issued.prefix, record);
        (user_id, issued.token)
    }
}

#[async_trait]
impl UserSessionsRepo for MemoryUserSessions {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<UserSessionRecord>, RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self.by_prefix.lock().await.get(prefix).cloned())
    }

    async fn update_last_seen(&self, _id: Uuid, _at: OffsetDateTime) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct StaticHealth(pub bool);

#[async_trait]
impl HealthRepo for StaticHealth {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.0 {
            Ok(())
        } else {
            Err(RepoError::Timeout)
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub travel_data: Arc<MemoryTravelData>,
    pub users: Arc<MemoryUserSessions>,
    pub store: Arc<dyn CacheStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryStore::new(&config));
        store.connect().await.expect("memory store connects");
        Self::with_store(config, store, true)
    }

    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>, healthy: bool) -> Self {
        let travel_data = Arc::new(MemoryTravelData::default());
        let uploads = Arc::new(MemoryUploadSessions::new(travel_data.clone()));
        let users = Arc::new(MemoryUserSessions::default());

        let api = ApiState {
            auth: Arc::new(SessionAuthService::new(users.clone())),
            travel_data: Arc::new(TravelDataService::new(travel_data.clone())),
            upload_sessions: Arc::new(UploadSessionService::new(uploads)),
        };
        let router = build_router(RouterState {
            api,
            cache: CacheState::new(config, store.clone()),
            health: Arc::new(StaticHealth(healthy)),
            request_body_limit: 1024 * 1024,
        });

        Self {
            router,
            travel_data,
            users,
            store,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let response = self.dispatch(method, uri, token, body).await;
        // let detached cache writes land before the next request
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        response
    }

    /// Like [`Self::send`], but detached cache writes may still be pending.
    pub async fn dispatch(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router is infallible")
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn cache_status(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("x-cache")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
