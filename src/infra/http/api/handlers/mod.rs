mod travel_data;
mod upload_sessions;

pub use travel_data::{create_travel_data, delete_travel_data, list_travel_data, update_travel_data};
pub use upload_sessions::{get_upload_session, import_upload_session, list_upload_sessions};

use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::application::travel_data::TravelDataError;
use crate::application::upload_sessions::UploadSessionError;
use crate::domain::travel_data::FieldError;
use crate::domain::users::UserStatus;

use super::error::{ApiError, codes};

pub(super) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::invalid_id(raw))
}

pub(super) fn parse_json_body(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice::<Value>(body).map_err(|err| {
        ApiError::validation(vec![FieldError::new("body", "expected a JSON object")])
            .with_detail(err.to_string())
    })
}

fn inactive(status: UserStatus) -> ApiError {
    ApiError::forbidden().with_detail(format!("account status is {status}"))
}

pub(super) fn repo_error(err: RepoError) -> ApiError {
    let detail = err.to_string();
    let error = match err {
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
        ),
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::Duplicate { .. } => {
            ApiError::new(StatusCode::CONFLICT, codes::DUPLICATE, "Duplicate record")
        }
        RepoError::InvalidInput { .. } => {
            ApiError::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, "Invalid input")
        }
        RepoError::Integrity { .. } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
        ),
        RepoError::Persistence(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Internal server error",
        ),
    };
    error.with_detail(detail)
}

impl From<TravelDataError> for ApiError {
    fn from(err: TravelDataError) -> Self {
        match err {
            TravelDataError::Inactive(status) => inactive(status),
            TravelDataError::Validation(errors) => ApiError::validation(errors),
            TravelDataError::EmptyUpdate => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::EMPTY_UPDATE,
                "No valid fields to update",
            ),
            TravelDataError::NotFound => ApiError::not_found("Travel data not found"),
            TravelDataError::Repo(err) => repo_error(err),
        }
    }
}

impl From<UploadSessionError> for ApiError {
    fn from(err: UploadSessionError) -> Self {
        match err {
            UploadSessionError::Inactive(status) => inactive(status),
            UploadSessionError::Validation(errors) => ApiError::validation(errors),
            UploadSessionError::NotFound => ApiError::not_found("Upload session not found"),
            UploadSessionError::Repo(err) => repo_error(err),
        }
    }
}
