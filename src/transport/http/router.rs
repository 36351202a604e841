use crate::transport::http::handlers::{channels, collections, health, methods};
use crate::transport::http::types::{
    ApiResponse, CallRequest, ChannelSnapshotResponse, CollectionSchemaResponse,
};
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        methods::call_method_handler,
        channels::snapshot_channel_handler,
        collections::collection_schema_handler
    ),
    components(schemas(
        ApiResponse,
        CallRequest,
        ChannelSnapshotResponse,
        CollectionSchemaResponse
    ))
)]
pub struct ApiDoc;

pub fn create_router(app_state: crate::transport::http::types::AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/methods/:name", post(methods::call_method_handler))
        .route("/channels/:name", post(channels::snapshot_channel_handler))
        .route(
            "/collections/:name/schema",
            get(collections::collection_schema_handler),
        )
        .with_state(app_state)
}
