use axum::extract::State;
use axum::routing::get;
use axum::{debug_handler, Json, Router};
use utoipa::OpenApi;

use crate::error::HostResult;
use crate::AppState;

#[utoipa::path(get, path = "/whitelist",
    tag = "Notarization",
    responses (
        (status = 200, description = "Hostnames and reserved URLs the extractor accepts", body = Vec<String>),
    )
)]
#[debug_handler(state = AppState)]
/// The configured whitelist, reserved URLs included.
async fn handler(State(state): State<AppState>) -> HostResult<Json<Vec<String>>> {
    Ok(Json(state.config.whitelist.clone()))
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
