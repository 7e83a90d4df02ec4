use axum::body::HttpBody;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::HostError;
use crate::{metrics, AppState};

pub mod enclave_info;
mod health;
mod metrics_route;
mod notarize;
mod random;
mod whitelist;

/// Ceiling on request bodies; oversized requests get a 413.
pub const MAX_BODY_SIZE: u64 = 1 << 20;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Aleo Notary Server API",
        version = "1.0",
        description = "TEE notarization backend for the Aleo oracle",
    ),
    components(
        schemas(
            notary_lib::proof_data::AttestationRequest,
            notary_lib::proof_data::AttestationRequestWithDebug,
            notary_lib::proof_data::EncodingOptions,
            crate::attestation::AttestationResponse,
            crate::attestation::AttestationResponseForMultipleTokens,
            crate::attestation::DebugAttestationResponse,
            crate::price_feed::PriceFeedResult,
        )
    ),
    tags(
        (name = "Notarization", description = "Routes that produce attestations"),
        (name = "Enclave", description = "Routes that describe the enclave identity"),
        (name = "Health", description = "Routes that report the server health status"),
        (name = "Metrics", description = "Routes that give detailed insight into the server")
    )
)]
/// The root API struct which is generated from the `OpenApi` derive macro.
pub struct Docs;

#[must_use]
pub fn create_docs() -> utoipa::openapi::OpenApi {
    [
        notarize::create_docs(),
        random::create_docs(),
        enclave_info::create_docs(),
        whitelist::create_docs(),
        health::create_docs(),
        metrics_route::create_docs(),
    ]
    .into_iter()
    .fold(Docs::openapi(), |mut doc, sub_doc| {
        doc.merge(sub_doc);
        doc
    })
}

pub fn create_router(concurrency_limit: usize) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_origin(cors::Any);
    let compression = CompressionLayer::new();

    let middleware = ServiceBuilder::new().layer(cors).layer(compression).layer(
        SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ),
    );

    let trace = TraceLayer::new_for_http();

    let docs = create_docs();

    Router::new()
        .route("/", get(root_handler))
        // Only the notarization routes get the concurrency limit; health
        // and metrics must stay reachable under load.
        .nest(
            "/notarize",
            notarize::create_router()
                .layer(ServiceBuilder::new().concurrency_limit(concurrency_limit)),
        )
        .nest(
            "/random",
            random::create_router()
                .layer(ServiceBuilder::new().concurrency_limit(concurrency_limit)),
        )
        .nest("/enclave-info", enclave_info::create_router())
        .nest("/whitelist", whitelist::create_router())
        .nest("/health", health::create_router())
        .nest("/metrics", metrics_route::create_router())
        .layer(middleware)
        .layer(middleware::from_fn(track_and_bound_request))
        .layer(trace)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs.clone()))
        .merge(Scalar::with_url("/scalar", docs))
        .fallback(|uri: Uri| async move {
            (StatusCode::NOT_FOUND, format!("No handler found for {uri}"))
        })
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "aleo-notary",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn track_and_bound_request(req: Request, next: Next) -> Response {
    metrics::inc_http_request_count();

    let content_length = match req.body().size_hint().upper() {
        Some(v) => v,
        None => MAX_BODY_SIZE + 1,
    };
    if content_length > MAX_BODY_SIZE {
        return HostError::RequestBodyTooLarge.into_response();
    }

    next.run(req).await
}
