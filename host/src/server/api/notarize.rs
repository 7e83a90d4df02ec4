use std::collections::HashSet;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::routing::post;
use axum::{debug_handler, Json, Router};
use notary_lib::proof_data::AttestationRequestWithDebug;
use utoipa::OpenApi;

use crate::attestation::{
    notarize_many, notarize_single, AttestationResponse, NotarizeResponse,
};
use crate::error::{HostError, HostResult};
use crate::{metrics, AppState};

#[utoipa::path(post, path = "/notarize",
    tag = "Notarization",
    request_body = AttestationRequestWithDebug,
    responses (
        (status = 200, description = "Successfully created an attestation", body = AttestationResponse),
        (status = 400, description = "Malformed or invalid request"),
        (status = 413, description = "Request body too large"),
        (status = 415, description = "Unsupported media type"),
    )
)]
#[debug_handler(state = AppState)]
/// Produce an attestation for one request, or one merged attestation for an
/// array of requests.
///
/// The decoder tries an array first, then a single object. Batched
/// requests are extracted in parallel, sealed into one quote in array
/// order and signed once.
async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HostResult<Json<NotarizeResponse>> {
    require_json(&headers)?;

    // Array first, then a single object.
    if let Ok(requests) = serde_json::from_slice::<Vec<AttestationRequestWithDebug>>(&body) {
        reject_duplicate_urls(&requests)?;
        let response = notarize_many(&state, &requests).await.map_err(count_error)?;
        return Ok(Json(response));
    }

    let request: AttestationRequestWithDebug = serde_json::from_slice(&body)
        .map_err(|e| HostError::DecodingRequestBody(e.to_string()))?;
    let response = notarize_single(&state, &request).await.map_err(count_error)?;
    Ok(Json(response))
}

fn require_json(headers: &HeaderMap) -> Result<(), HostError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return Err(HostError::InvalidContentType(content_type.to_string()));
    }
    Ok(())
}

/// The same target twice in one batch would seal ambiguous chunks.
fn reject_duplicate_urls(requests: &[AttestationRequestWithDebug]) -> Result<(), HostError> {
    let mut seen = HashSet::new();
    for request in requests {
        let url = request.request.url.trim().to_ascii_lowercase();
        if !seen.insert(url.clone()) {
            return Err(HostError::ValidationFailed {
                field: "url".to_string(),
                reason: format!("duplicate target {url:?} in batch"),
            });
        }
    }
    Ok(())
}

fn count_error(error: HostError) -> HostError {
    metrics::inc_notarization("error");
    error
}

#[derive(OpenApi)]
#[openapi(paths(handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(handler))
}
