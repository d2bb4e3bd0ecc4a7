//! Create, list, update and delete ledger rows on behalf of a caller.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::pagination::{PageWindow, Paginated};
use crate::application::repos::{RecordScope, RepoError, TravelDataRepo};
use crate::domain::travel_data::{FieldError, NewTravelData, TravelDataPatch, TravelDataRecord};
use crate::domain::users::{Principal, UserStatus};

#[derive(Debug, Error)]
pub enum TravelDataError {
    #[error("account is {0}, not active")]
    Inactive(UserStatus),
    #[error("payload failed validation")]
    Validation(Vec<FieldError>),
    #[error("No valid fields to update")]
    EmptyUpdate,
    #[error("travel data record not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct TravelDataService {
    repo: Arc<dyn TravelDataRepo>,
}

impl TravelDataService {
    pub fn new(repo: Arc<dyn TravelDataRepo>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        payload: &Value,
    ) -> Result<TravelDataRecord, TravelDataError> {
        ensure_active(principal)?;
        let patch = TravelDataPatch::from_json(payload).map_err(TravelDataError::Validation)?;
        let record = self
            .repo
            .insert(NewTravelData::from_patch(patch, Some(principal.user_id)))
            .await?;

        info!(
            target = "ledgerdesk::travel_data",
            id = %record.id,
            owner = %principal.user_id,
            "travel data created"
        );
        Ok(record)
    }

    pub async fn list_by_session(
        &self,
        principal: &Principal,
        session_id: &str,
        window: PageWindow,
    ) -> Result<Paginated<TravelDataRecord>, TravelDataError> {
        let page = self
            .repo
            .list_by_session(session_id, RecordScope::from(principal), window)
            .await?;
        Ok(Paginated::new(page.items, page.total, window))
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        payload: &Value,
    ) -> Result<TravelDataRecord, TravelDataError> {
        ensure_active(principal)?;
        let patch = TravelDataPatch::from_json(payload).map_err(TravelDataError::Validation)?;
        if patch.is_empty() {
            return Err(TravelDataError::EmptyUpdate);
        }

        let record = self
            .repo
            .update(id, RecordScope::from(principal), &patch)
            .await?
            .ok_or(TravelDataError::NotFound)?;

        debug!(
            target = "ledgerdesk::travel_data",
            id = %id,
            updated_at = %record.updated_at,
            "travel data updated"
        );
        Ok(record)
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), TravelDataError> {
        ensure_active(principal)?;
        if self.repo.delete(id, RecordScope::from(principal)).await? {
            info!(target = "ledgerdesk::travel_data", id = %id, "travel data deleted");
            Ok(())
        } else {
            Err(TravelDataError::NotFound)
        }
    }
}

pub(crate) fn ensure_active(principal: &Principal) -> Result<(), TravelDataError> {
    if principal.is_active() {
        Ok(())
    } else {
        Err(TravelDataError::Inactive(principal.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use time::OffsetDateTime;

    use crate::application::repos::TravelDataPage;
    use crate::domain::users::UserRole;

    #[derive(Default)]
    struct CountingRepo {
        writes: Mutex<usize>,
    }

    #[async_trait]
    impl TravelDataRepo for CountingRepo {
        async fn insert(&self, record: NewTravelData) -> Result<TravelDataRecord, RepoError> {
            *self.writes.lock().unwrap() += 1;
            Ok(record.into_record(OffsetDateTime::now_utc()))
        }

        async fn list_by_session(
            &self,
            _session_id: &str,
            _scope: RecordScope,
            _window: PageWindow,
        ) -> Result<TravelDataPage, RepoError> {
            Ok(TravelDataPage {
                items: Vec::new(),
                total: 0,
            })
        }

        async fn update(
            &self,
            _id: Uuid,
            _scope: RecordScope,
            _patch: &TravelDataPatch,
        ) -> Result<Option<TravelDataRecord>, RepoError> {
            *self.writes.lock().unwrap() += 1;
            Ok(None)
        }

        async fn delete(&self, _id: Uuid, _scope: RecordScope) -> Result<bool, RepoError> {
            *self.writes.lock().unwrap() += 1;
            Ok(false)
        }
    }

    fn principal(status: UserStatus) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "agent@example.com".to_string(),
            role: UserRole::User,
            status,
        }
    }

    #[tokio::test]
    async fn empty_update_never_reaches_the_repository() {
        let repo = Arc::new(CountingRepo::default());
        let service = TravelDataService::new(repo.clone());

        let err = service
            .update(
                &principal(UserStatus::Active),
                Uuid::new_v4(),
                &json!({ "voucher": null }),
            )
            .await
            .expect_err("empty update");

        assert!(matches!(err, TravelDataError::EmptyUpdate));
        assert_eq!(*repo.writes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn inactive_callers_cannot_write() {
        let repo = Arc::new(CountingRepo::default());
        let service = TravelDataService::new(repo.clone());

        let err = service
            .create(&principal(UserStatus::Pending), &json!({ "voucher": "V1" }))
            .await
            .expect_err("pending account");

        assert!(matches!(err, TravelDataError::Inactive(UserStatus::Pending)));
        assert_eq!(*repo.writes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn create_stamps_the_caller_as_owner() {
        let service = TravelDataService::new(Arc::new(CountingRepo::default()));
        let caller = principal(UserStatus::Active);

        let record = service
            .create(&caller, &json!({ "voucher": "V1", "owner_id": Uuid::nil() }))
            .await
            .expect("created");

        assert_eq!(record.owner_id, Some(caller.user_id));
    }

    #[tokio::test]
    async fn missing_delete_is_not_found() {
        let service = TravelDataService::new(Arc::new(CountingRepo::default()));
        let err = service
            .delete(&principal(UserStatus::Active), Uuid::new_v4())
            .await
            .expect_err("nothing to delete");
        assert!(matches!(err, TravelDataError::NotFound));
    }
}
