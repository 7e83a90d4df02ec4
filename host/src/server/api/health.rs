use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{debug_handler, Json, Router};
use serde_json::json;
use utoipa::OpenApi;

use crate::AppState;

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses (
        (status = 200, description = "Notarization server is healthy"),
    )
)]
#[debug_handler(state = AppState)]
/// Health check
///
/// The timestamp here is the local clock; it is informational and never
/// enters an attestation.
async fn handler() -> Response {
    let body = Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }));
    ([(header::CACHE_CONTROL, "no-store")], body).into_response()
}

#[derive(OpenApi)]
#[openapi(paths(handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(handler))
}
