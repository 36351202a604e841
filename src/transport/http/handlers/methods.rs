use crate::transport::http::handlers::common::{caller_context, error_response};
use crate::transport::http::types::{json_422, ApiResponse, AppState, CallRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    post,
    path = "/methods/{name}",
    params(
        ("name" = String, Path, description = "Procedure name (e.g. posts.insert)")
    ),
    request_body = CallRequest,
    responses(
        (status = 200, description = "Procedure result: new id, or affected count", body = ApiResponse),
        (status = 400, description = "Validation failed; nothing was written", body = ApiResponse),
        (status = 404, description = "Unknown procedure", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse),
        (status = 500, description = "Internal server error", body = ApiResponse)
    )
)]
pub async fn call_method_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    request: Result<Json<CallRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, "{\"args\": [...]}").into_response(),
    };
    let context = caller_context(&headers);

    match state.server.call(name.trim(), context, request.args).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::ok(result))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
