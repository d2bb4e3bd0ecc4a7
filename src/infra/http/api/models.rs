//! Response shapes. Records carry their id twice, as `id` and `_id`, for
//! clients written against document-store style payloads.

use serde::Serialize;
use uuid::Uuid;

use crate::application::upload_sessions::ImportOutcome;
use crate::domain::travel_data::TravelDataRecord;
use crate::domain::upload_sessions::UploadSessionRecord;

#[derive(Debug, Serialize)]
pub struct TravelDataResponse {
    #[serde(rename = "_id")]
    pub legacy_id: Uuid,
    #[serde(flatten)]
    pub record: TravelDataRecord,
}

impl From<TravelDataRecord> for TravelDataResponse {
    fn from(record: TravelDataRecord) -> Self {
        Self {
            legacy_id: record.id,
            record,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadSessionResponse {
    #[serde(rename = "_id")]
    pub legacy_id: Uuid,
    #[serde(flatten)]
    pub session: UploadSessionRecord,
}

impl From<UploadSessionRecord> for UploadSessionResponse {
    fn from(session: UploadSessionRecord) -> Self {
        Self {
            legacy_id: session.id,
            session,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub session: UploadSessionResponse,
    pub inserted: usize,
}

impl From<ImportOutcome> for ImportResponse {
    fn from(outcome: ImportOutcome) -> Self {
        Self {
            session: outcome.session.into(),
            inserted: outcome.inserted,
        }
    }
}
