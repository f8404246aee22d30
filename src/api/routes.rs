use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::AppState;
use crate::core::assistant::{CommandResult, Domain, RawCommand};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "result": "Healthy Server!" }))
}

pub async fn accounting(
    State(state): State<AppState>,
    body: Result<Json<RawCommand>, JsonRejection>,
) -> Response {
    handle(state, Some(Domain::Accounting), body).await
}

pub async fn calendar(
    State(state): State<AppState>,
    body: Result<Json<RawCommand>, JsonRejection>,
) -> Response {
    handle(state, Some(Domain::Calendar), body).await
}

pub async fn weather(
    State(state): State<AppState>,
    body: Result<Json<RawCommand>, JsonRejection>,
) -> Response {
    handle(state, Some(Domain::Weather), body).await
}

/// Unified endpoint: the body's `agent_type` picks the domain.
pub async fn agent(
    State(state): State<AppState>,
    body: Result<Json<RawCommand>, JsonRejection>,
) -> Response {
    handle(state, None, body).await
}

async fn handle(
    state: AppState,
    route: Option<Domain>,
    body: Result<Json<RawCommand>, JsonRejection>,
) -> Response {
    let Json(raw) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected request body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    render(state.assistant.handle(route, raw).await)
}

/// Success payloads go out as-is; errors become `{ "error": message }`.
fn render(result: CommandResult) -> Response {
    match result {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(err) if err.is_caller_error() => {
            tracing::info!(error = %err, "Request rejected");
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            tracing::error!(error = %err, "Request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
