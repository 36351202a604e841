use crate::domain::hooks::CallerContext;
use crate::error::GuardError;
use crate::transport::http::types::ApiResponse;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::error;

pub const CALLER_HEADER: &str = "x-caller-id";
pub const SESSION_HEADER: &str = "x-session-id";

/// Caller identity as reported by the request headers. Missing headers mean anonymous.
pub fn caller_context(headers: &HeaderMap) -> CallerContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    CallerContext {
        caller_id: header(CALLER_HEADER),
        session_id: header(SESSION_HEADER),
    }
}

pub fn error_response(err: GuardError) -> (StatusCode, Json<ApiResponse>) {
    let status = match &err {
        GuardError::Validation(_) => StatusCode::BAD_REQUEST,
        GuardError::NotFound { .. } => StatusCode::NOT_FOUND,
        GuardError::Authorization(_) => StatusCode::FORBIDDEN,
        GuardError::Configuration(_) | GuardError::Hook { .. } => {
            error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let mut body = ApiResponse::failure(err.code(), err.to_string());
    if let GuardError::Validation(v) = &err {
        body.violations = serde_json::to_value(&v.violations).ok();
    }
    (status, Json(body))
}
