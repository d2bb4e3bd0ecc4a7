use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::auth::AuthError;

use super::error::{ApiError, codes};
use super::handlers::repo_error;
use super::state::ApiState;

/// Resolve the bearer token to a `Principal` and attach it to the request.
pub async fn require_session(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers().get(header::AUTHORIZATION)) else {
        return ApiError::unauthorized()
            .with_detail("missing bearer token")
            .into_response();
    };

    let principal = match state.auth.authenticate(&token).await {
        Ok(principal) => principal,
        Err(err @ AuthError::Invalid) => {
            return ApiError::unauthorized()
                .with_detail(err.to_string())
                .into_response();
        }
        Err(AuthError::Expired) => {
            return ApiError::new(StatusCode::UNAUTHORIZED, codes::EXPIRED, "Session expired")
                .into_response();
        }
        Err(AuthError::Revoked) => {
            return ApiError::new(StatusCode::UNAUTHORIZED, codes::REVOKED, "Session revoked")
                .into_response();
        }
        Err(AuthError::Unavailable(err)) => return repo_error(err).into_response(),
    };

    request.extensions_mut().insert(principal.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        let value = HeaderValue::from_static("Bearer ts_abc_secret");
        assert_eq!(extract_token(Some(&value)).as_deref(), Some("ts_abc_secret"));

        let basic = HeaderValue::from_static("Basic dXNlcg==");
        assert_eq!(extract_token(Some(&basic)), None);

        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(extract_token(Some(&empty)), None);
        assert_eq!(extract_token(None), None);
    }
}
