use crate::transport::http::handlers::common::error_response;
use crate::transport::http::types::{ApiResponse, AppState, CollectionSchemaResponse};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/collections/{name}/schema",
    params(
        ("name" = String, Path, description = "Collection name (e.g. posts)")
    ),
    responses(
        (status = 200, description = "Schema, mutation-safe schema and procedure names", body = CollectionSchemaResponse),
        (status = 404, description = "Unknown collection", body = ApiResponse)
    )
)]
pub async fn collection_schema_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let collection = match state.server.collection(name.trim()) {
        Ok(c) => c,
        Err(e) => return error_response(e).into_response(),
    };
    let projection = match collection.mutation_safe_schema() {
        Ok(p) => p,
        Err(e) => return error_response(e).into_response(),
    };
    let names = collection.procedure_names();
    let channels = if collection.channels().is_some() {
        names.channels().iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    };

    let body = CollectionSchemaResponse {
        name: collection.name().to_string(),
        schema: serde_json::to_value(&*collection.schema()).unwrap_or_default(),
        mutation_safe_schema: serde_json::to_value(&projection).unwrap_or_default(),
        methods: names.methods().iter().map(|s| s.to_string()).collect(),
        channels,
        queries: collection.queries().names(),
    };
    (
        StatusCode::OK,
        Json(ApiResponse::ok(serde_json::to_value(body).unwrap_or_default())),
    )
        .into_response()
}
