//! Import a parsed ledger as one upload session.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{RecordScope, RepoError, UploadSessionsRepo};
use crate::domain::travel_data::{FieldError, NewTravelData, TravelDataPatch};
use crate::domain::upload_sessions::{NewUploadSession, OpeningBalance, UploadSessionRecord};
use crate::domain::users::{Principal, UserStatus};

#[derive(Debug, Error)]
pub enum UploadSessionError {
    #[error("account is {0}, not active")]
    Inactive(UserStatus),
    #[error("payload failed validation")]
    Validation(Vec<FieldError>),
    #[error("upload session not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub session: UploadSessionRecord,
    pub inserted: usize,
}

#[derive(Clone)]
pub struct UploadSessionService {
    repo: Arc<dyn UploadSessionsRepo>,
}

impl UploadSessionService {
    pub fn new(repo: Arc<dyn UploadSessionsRepo>) -> Self {
        Self { repo }
    }

    /// Validate every row before anything is written; one bad row rejects the import.
    pub async fn import(
        &self,
        principal: &Principal,
        payload: &Value,
    ) -> Result<ImportOutcome, UploadSessionError> {
        if !principal.is_active() {
            return Err(UploadSessionError::Inactive(principal.status));
        }

        let (session, records) = parse_import(payload, principal.user_id)?;
        let inserted = records.len();
        let session = self.repo.create_with_records(session, records).await?;

        info!(
            target = "ledgerdesk::upload_sessions",
            id = %session.id,
            filename = %session.filename,
            inserted,
            "upload session imported"
        );
        Ok(ImportOutcome { session, inserted })
    }

    pub async fn list(
        &self,
        principal: &Principal,
    ) -> Result<Vec<UploadSessionRecord>, UploadSessionError> {
        Ok(self.repo.list_sessions(RecordScope::from(principal)).await?)
    }

    pub async fn get(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<UploadSessionRecord, UploadSessionError> {
        self.repo
            .find_session(id, RecordScope::from(principal))
            .await?
            .ok_or(UploadSessionError::NotFound)
    }
}

fn parse_import(
    payload: &Value,
    owner_id: Uuid,
) -> Result<(NewUploadSession, Vec<NewTravelData>), UploadSessionError> {
    let Some(object) = payload.as_object() else {
        return Err(UploadSessionError::Validation(vec![FieldError::new(
            "body",
            "expected a JSON object",
        )]));
    };

    let mut errors = Vec::new();

    let filename = match object.get("filename") {
        Some(Value::String(name)) => name.as_str(),
        _ => {
            errors.push(FieldError::new("filename", "expected a string"));
            ""
        }
    };

    let opening_balance = match object.get("opening_balance") {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<OpeningBalance>(value.clone()) {
            Ok(balance) => Some(balance),
            Err(_) => {
                errors.push(FieldError::new(
                    "opening_balance",
                    "expected {date, amount}",
                ));
                None
            }
        },
    };

    let rows: &[Value] = match object.get("records") {
        Some(Value::Array(rows)) => rows.as_slice(),
        _ => {
            errors.push(FieldError::new("records", "expected an array"));
            &[]
        }
    };

    let session = if errors.is_empty() {
        match NewUploadSession::new(filename, opening_balance, Some(owner_id)) {
            Ok(session) => Some(session),
            Err(err) => {
                errors.push(err);
                None
            }
        }
    } else {
        None
    };

    let session_key = session.as_ref().map(NewUploadSession::session_key);
    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match TravelDataPatch::from_json(row) {
            Ok(mut patch) => {
                patch.session_id = session_key.clone();
                records.push(NewTravelData::from_patch(patch, Some(owner_id)));
            }
            Err(row_errors) => {
                let prefix = format!("records[{index}].");
                errors.extend(row_errors.into_iter().map(|e| e.nested(&prefix)));
            }
        }
    }

    match session {
        Some(session) if errors.is_empty() => Ok((session, records)),
        _ => Err(UploadSessionError::Validation(errors)),
    }
}
