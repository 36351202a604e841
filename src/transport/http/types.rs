use crate::app::publication::ChannelState;
use crate::transport::Server;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code, e.g. `VALIDATION` or `NOT_FOUND`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Per-field violations for `VALIDATION` errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Vec<Object>)]
    pub violations: Option<JsonValue>,
}

impl ApiResponse {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            violations: None,
        }
    }

    pub fn failure(code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code.to_string()),
            violations: None,
        }
    }
}

/// Body of a published channel snapshot.
#[derive(Serialize, Debug, ToSchema)]
pub struct ChannelSnapshotResponse {
    pub channel: String,
    /// `publishing` when the request was served, `closed` when a hook rejected it.
    #[schema(value_type = String)]
    pub state: ChannelState,
    /// Documents keyed by collection name.
    #[schema(value_type = Object)]
    pub documents: JsonValue,
    /// Live count of every match, for `byQuery` channels.
    pub count: Option<u64>,
}

/// Everything a form or list renderer needs to know about a collection.
#[derive(Serialize, Debug, ToSchema)]
pub struct CollectionSchemaResponse {
    pub name: String,
    #[schema(value_type = Object)]
    pub schema: JsonValue,
    /// Fields writable through the generated procedures, in order.
    #[schema(value_type = Object)]
    pub mutation_safe_schema: JsonValue,
    pub methods: Vec<String>,
    pub channels: Vec<String>,
    pub queries: Vec<String>,
}

pub fn json_422(err: JsonRejection, expected: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiResponse::failure(
            "INVALID_JSON",
            format!("Invalid JSON body: {} (expected: {})", err, expected),
        )),
    )
}

/// Positional arguments of a procedure call or channel subscription.
///
/// `{"args": [{"title": "..."}]}` for `posts.insert`,
/// `{"args": ["posts.all", {"limit": 5}]}` for `posts.byQuery`.
#[derive(Deserialize, Debug, ToSchema)]
pub struct CallRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub args: JsonValue,
}
