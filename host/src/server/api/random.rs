use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{debug_handler, Json, Router};
use notary_lib::proof_data::{
    AttestationRequest, EncodingOptions, EncodingValue, HttpMethod, ResponseFormat,
};
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::attestation::{build_attestation, AttestationResponse, NotarizeResponse};
use crate::error::{HostError, HostResult};
use crate::extractor::ExtractDataResult;
use crate::{metrics, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct RandomParams {
    /// Exclusive upper bound, decimal, `2 ..= 2^127`.
    max: String,
}

#[utoipa::path(get, path = "/random",
    tag = "Notarization",
    params(RandomParams),
    responses (
        (status = 200, description = "Successfully attested a random number", body = AttestationResponse),
        (status = 400, description = "Unusable max bound"),
    )
)]
#[debug_handler(state = AppState)]
/// Attest a uniform random integer in `[0, max)`.
///
/// The value is drawn from the enclave's CSPRNG and sealed through the
/// same pipeline as a notarization, under the reserved
/// `crypto/rand:<max>` URL.
async fn handler(
    State(state): State<AppState>,
    Query(params): Query<RandomParams>,
) -> HostResult<Json<NotarizeResponse>> {
    metrics::inc_random_request();

    let max = parse_max(&params.max)?;
    let value = OsRng.gen_biguint_below(&max).to_string();

    let request = AttestationRequest {
        url: format!("crypto/rand:{max}"),
        request_method: HttpMethod::Get,
        selector: String::new(),
        response_format: ResponseFormat::Json,
        html_result_type: None,
        request_body: None,
        request_content_type: None,
        request_headers: HashMap::new(),
        encoding_options: EncodingOptions { value: EncodingValue::Int, precision: 0 },
    };
    let extraction = ExtractDataResult {
        response_body: value.clone().into_bytes(),
        attestation_data: value,
        status_code: 200,
    };

    let timestamp = state.time.unix_now().await?;
    let response = build_attestation(&state, &request, &extraction, timestamp, false).await?;
    Ok(Json(response))
}

fn parse_max(raw: &str) -> Result<BigUint, HostError> {
    let fail = |reason: String| HostError::ValidationFailed { field: "max".to_string(), reason };
    let max = BigUint::from_str(raw.trim())
        .map_err(|_| fail(format!("{raw:?} is not a decimal integer")))?;
    if max <= BigUint::from(1u32) {
        return Err(fail("must be greater than 1".to_string()));
    }
    if max > BigUint::from(1u32) << 127u32 {
        return Err(fail("must not exceed 2^127".to_string()));
    }
    Ok(max)
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
