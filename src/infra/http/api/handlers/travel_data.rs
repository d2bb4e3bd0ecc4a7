use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::application::pagination::{PageQuery, Paginated};
use crate::domain::users::Principal;

use super::super::error::ApiError;
use super::super::models::TravelDataResponse;
use super::super::state::ApiState;
use super::{parse_id, parse_json_body};

pub async fn create_travel_data(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = parse_json_body(&body)?;
    let record = state.travel_data.create(&principal, &payload).await?;
    Ok((StatusCode::CREATED, Json(TravelDataResponse::from(record))).into_response())
}

pub async fn list_travel_data(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<TravelDataResponse>>, ApiError> {
    let page = state
        .travel_data
        .list_by_session(&principal, &session_id, query.window())
        .await?;
    Ok(Json(page.map(TravelDataResponse::from)))
}

pub async fn update_travel_data(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<TravelDataResponse>, ApiError> {
    let id = parse_id(&id)?;
    let payload = parse_json_body(&body)?;
    let record = state.travel_data.update(&principal, id, &payload).await?;
    Ok(Json(record.into()))
}

pub async fn delete_travel_data(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.travel_data.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
