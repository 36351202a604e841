use crate::transport::http::handlers::common::{caller_context, error_response};
use crate::transport::http::types::{
    json_422, ApiResponse, AppState, CallRequest, ChannelSnapshotResponse,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

/// Opens a channel, returns what it publishes right now, then closes it.
#[utoipa::path(
    post,
    path = "/channels/{name}",
    params(
        ("name" = String, Path, description = "Channel name (e.g. posts.byQuery)")
    ),
    request_body = CallRequest,
    responses(
        (status = 200, description = "Published snapshot (empty when a hook rejected the request)", body = ChannelSnapshotResponse),
        (status = 400, description = "Invalid channel arguments", body = ApiResponse),
        (status = 404, description = "Unknown channel or query", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse),
        (status = 500, description = "Internal server error", body = ApiResponse)
    )
)]
pub async fn snapshot_channel_handler(
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

    let mut publication = match state.server.subscribe(name.trim(), context, request.args).await {
        Ok(p) => p,
        Err(e) => return error_response(e).into_response(),
    };
    let published_state = publication.state();
    let snapshot = publication.snapshot().await;
    publication.close();

    let set = match snapshot {
        Ok(set) => set,
        Err(e) => return error_response(e).into_response(),
    };
    let body = ChannelSnapshotResponse {
        channel: publication.name().to_string(),
        state: published_state,
        documents: serde_json::to_value(&set.documents).unwrap_or_default(),
        count: set.count,
    };
    (
        StatusCode::OK,
        Json(ApiResponse::ok(serde_json::to_value(body).unwrap_or_default())),
    )
        .into_response()
}
