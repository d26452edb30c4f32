// HTTP route handlers for the Crucible API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use crucible_common::language::{profiles, LanguageProfile};
use crucible_common::types::ExecutionRequest;
use crucible_engine::ExecutionError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: &'static [LanguageProfile],
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Client mistakes come back as 400 with detail; everything else is a
/// generic 500 with the detail kept in the logs.
pub fn execution_error_response(err: &ExecutionError) -> Response {
    if err.is_client_error() {
        error_response(StatusCode::BAD_REQUEST, err.public_message())
    } else {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, err.public_message())
    }
}

/// POST /api/codeexecution/execute - Run a submission and wait for its result
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed execution request");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.engine.execute(&request).await {
        Ok(result) => {
            info!(
                language = %request.language,
                status = ?result.status,
                success = result.success,
                execution_ms = result.execution_time_ms,
                "Execution request served"
            );
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            if !e.is_client_error() {
                error!(language = %request.language, error = ?e, "Execution request failed");
            }
            execution_error_response(&e)
        }
    }
}

/// GET /api/codeexecution/languages - Supported languages and their images
pub async fn list_languages() -> impl IntoResponse {
    Json(LanguagesResponse {
        languages: profiles(),
    })
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
