// src/api/handlers.rs

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::{types::*, ApiState};
use crate::infra::errors::PilotError;

pub const SESSION_HEADER: &str = "x-session-id";

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: PilotError) -> ApiError {
    let status = err.status_code();
    error_response(status, err)
}

/// Failures inside a task run: 400 for a malformed request, 500 otherwise.
fn pipeline_error(err: PilotError) -> ApiError {
    let status = match err {
        PilotError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err)
}

fn error_response(status: StatusCode, err: PilotError) -> ApiError {
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            detail: err.to_string(),
        }),
    )
}

fn presented_session(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// The session a read-only endpoint is asking about. A missing header is
/// reported the same way as an unknown session.
fn required_session(headers: &HeaderMap) -> Result<&str, ApiError> {
    presented_session(headers)
        .ok_or_else(|| api_error(PilotError::NotFound("(no X-Session-ID header)".into())))
}

/// POST /execute-task — Run one task in the caller's session.
pub async fn execute_task(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let outcome = state
        .pipeline
        .execute(presented_session(&headers), body.into_input())
        .await
        .map_err(pipeline_error)?;
    Ok(Json(outcome.into()))
}

/// GET /session/info
pub async fn session_info(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SessionInfo>, ApiError> {
    let session_id = required_session(&headers)?;
    let record = state.sessions.get_data(session_id).await.map_err(api_error)?;
    let history_count = state
        .sessions
        .history_count(session_id)
        .await
        .map_err(api_error)?;

    Ok(Json(SessionInfo {
        session_id: record.session_id,
        created_at: record.created_at,
        current_url: record.current_url,
        history_count,
    }))
}

/// GET /session/history?limit=N
pub async fn session_history(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session_id = required_session(&headers)?;
    state.sessions.get_data(session_id).await.map_err(api_error)?;
    let history = state
        .sessions
        .get_history(session_id, query.limit)
        .await
        .map_err(api_error)?;

    Ok(Json(HistoryResponse {
        session_id: session_id.to_string(),
        history,
    }))
}

/// POST /session/new
pub async fn new_session(
    State(state): State<ApiState>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let session_id = state.sessions.create().await.map_err(api_error)?;
    Ok(Json(NewSessionResponse {
        session_id,
        message: "New session created".into(),
    }))
}

/// GET /session/{id}/clean-screenshot?full_page=bool
pub async fn clean_screenshot(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Query(query): Query<ScreenshotQuery>,
) -> Result<Json<ScreenshotResponse>, ApiError> {
    let screenshot = state
        .pipeline
        .clean_screenshot(&session_id, query.full_page)
        .await
        .map_err(api_error)?;
    Ok(Json(ScreenshotResponse { screenshot }))
}

/// GET /health — Health check (no session required).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_not_found_is_server_error() {
        let (status, Json(body)) = pipeline_error(PilotError::NotFound("abc".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.detail.contains("abc"));

        let (status, _) = pipeline_error(PilotError::ResourceNotFound("abc".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_pipeline_invalid_request_stays_400() {
        let (status, _) = pipeline_error(PilotError::InvalidRequest("empty".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_lookup_not_found_is_404() {
        let (status, _) = api_error(PilotError::NotFound("abc".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
