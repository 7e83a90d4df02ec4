use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use axum::routing::get;
use axum::{debug_handler, Router};
use prometheus::{Encoder, TextEncoder};
use utoipa::OpenApi;

use crate::error::HostResult;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Metrics",
    responses (
        (status = 200, description = "The request was successful", body = Body),
    ),
)]
#[debug_handler(state = AppState)]
/// Get prometheus metrics
async fn handler() -> HostResult<Response> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    let mf = prometheus::gather();
    encoder.encode(&mf, &mut buffer).unwrap();
    let resp = Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(Body::from(buffer))
        .unwrap();
    Ok(resp)
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
