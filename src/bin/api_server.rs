// src/bin/api_server.rs

use guarded_collection::domain::examples::{posts_and_comments_with, seed};
use guarded_collection::infra::{config, logging};
use guarded_collection::{transport, MemoryStore, Server};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    logging::init();

    // --- Collections ---
    let store = Arc::new(MemoryStore::new());
    let demo = posts_and_comments_with(store, config::pagination_params())?;
    if config::seed_demo() {
        let inserted = seed(&demo, 20, 2).await?;
        info!(inserted, "example posts seeded");
    }

    let server = Arc::new(Server::new());
    server.register(demo.posts)?;
    server.register(demo.comments)?;
    info!(methods = ?server.method_names(), channels = ?server.channel_names(), "transport ready");

    // --- API Server Initialization ---
    let app_state = transport::http::AppState { server };
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);

    let addr = config::http_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
