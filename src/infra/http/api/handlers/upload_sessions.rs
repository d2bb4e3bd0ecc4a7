use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::domain::users::Principal;

use super::super::error::ApiError;
use super::super::models::{ImportResponse, UploadSessionResponse};
use super::super::state::ApiState;
use super::{parse_id, parse_json_body};

pub async fn import_upload_session(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = parse_json_body(&body)?;
    let outcome = state.upload_sessions.import(&principal, &payload).await?;
    Ok((StatusCode::CREATED, Json(ImportResponse::from(outcome))).into_response())
}

pub async fn list_upload_sessions(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<UploadSessionResponse>>, ApiError> {
    let sessions = state.upload_sessions.list(&principal).await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

pub async fn get_upload_session(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<UploadSessionResponse>, ApiError> {
    let id = parse_id(&id)?;
    let session = state.upload_sessions.get(&principal, id).await?;
    Ok(Json(session.into()))
}
