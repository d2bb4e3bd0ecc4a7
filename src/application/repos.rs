//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageWindow;
use crate::domain::travel_data::{NewTravelData, TravelDataPatch, TravelDataRecord};
use crate::domain::upload_sessions::{NewUploadSession, UploadSessionRecord};
use crate::domain::users::{Principal, UserSessionRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Row visibility. `owner: None` means unrestricted (admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordScope {
    pub owner: Option<Uuid>,
}

impl RecordScope {
    pub fn unrestricted() -> Self {
        Self { owner: None }
    }

    pub fn owned_by(owner: Uuid) -> Self {
        Self { owner: Some(owner) }
    }

    pub fn allows(&self, owner_id: Option<Uuid>) -> bool {
        match self.owner {
            None => true,
            Some(owner) => owner_id == Some(owner),
        }
    }
}

impl From<&Principal> for RecordScope {
    fn from(principal: &Principal) -> Self {
        Self {
            owner: principal.owner_scope(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TravelDataPage {
    pub items: Vec<TravelDataRecord>,
    pub total: u64,
}

#[async_trait]
pub trait TravelDataRepo: Send + Sync {
    async fn insert(&self, record: NewTravelData) -> Result<TravelDataRecord, RepoError>;

    /// Newest-created first; rows sharing a timestamp list latest-inserted first.
    async fn list_by_session(
        &self,
        session_id: &str,
        scope: RecordScope,
        window: PageWindow,
    ) -> Result<TravelDataPage, RepoError>;

    /// Apply the present fields and advance `updated_at`. `None` when no visible row matched.
    async fn update(
        &self,
        id: Uuid,
        scope: RecordScope,
        patch: &TravelDataPatch,
    ) -> Result<Option<TravelDataRecord>, RepoError>;

    async fn delete(&self, id: Uuid, scope: RecordScope) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait UploadSessionsRepo: Send + Sync {
    /// Insert the session and its rows atomically.
    async fn create_with_records(
        &self,
        session: NewUploadSession,
        records: Vec<NewTravelData>,
    ) -> Result<UploadSessionRecord, RepoError>;

    async fn list_sessions(&self, scope: RecordScope)
    -> Result<Vec<UploadSessionRecord>, RepoError>;

    async fn find_session(
        &self,
        id: Uuid,
        scope: RecordScope,
    ) -> Result<Option<UploadSessionRecord>, RepoError>;
}

#[async_trait]
pub trait UserSessionsRepo: Send + Sync {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<UserSessionRecord>, RepoError>;

    async fn update_last_seen(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
