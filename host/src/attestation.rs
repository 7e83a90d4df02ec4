//! The attestation assembler: mask, encode, hash, quote, report, sign.

use std::time::Instant;

use base64_serde::base64_serde_type;
use notary_lib::proof_data::{
    prepare_multi_proof_data, prepare_proof_data, AttestationRequest, AttestationRequestWithDebug,
    EncodedPositions, EncodingValue, ProofPart, ResponseFormat, MAX_ORACLE_CHUNKS,
};
use notary_lib::OracleReport;
use serde::Serialize;
use tokio::task::JoinSet;
use utoipa::ToSchema;

use crate::error::HostError;
use crate::extractor::{self, ExtractDataResult, TargetUrl};
use crate::metrics;
use crate::AppState;

base64_serde_type!(Base64Standard, base64::engine::general_purpose::STANDARD);

/// TEE flavour tag; consumers dispatch verification on it.
pub const REPORT_TYPE: &str = "sgx";

/// A finished single-request attestation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    pub report_type: String,
    /// The TEE quote, standard base64.
    #[serde(with = "Base64Standard")]
    #[schema(value_type = String)]
    pub attestation_report: Vec<u8>,
    pub attestation_data: String,
    pub response_status_code: u16,
    pub timestamp: u64,
    /// Echo of the request with unaccepted headers masked.
    pub attestation_request: AttestationRequest,
    pub attestation_hash: String,
    pub request_hash: String,
    pub encoded_positions: EncodedPositions,
    pub oracle_report: String,
    pub signature: String,
    pub address: String,
}

/// One request's slice of a batched attestation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenAttestation {
    pub chunk_index: usize,
    pub attestation_request: AttestationRequest,
    pub attestation_data: String,
    pub response_status_code: u16,
    pub request_hash: String,
    pub encoded_positions: EncodedPositions,
}

/// A finished batched attestation: one quote and one signature over the
/// merged chunks.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponseForMultipleTokens {
    pub report_type: String,
    #[serde(with = "Base64Standard")]
    #[schema(value_type = String)]
    pub attestation_report: Vec<u8>,
    pub timestamp: u64,
    pub attestation_hash: String,
    pub oracle_report: String,
    pub signature: String,
    pub address: String,
    pub attestations: Vec<TokenAttestation>,
}

/// Debug short-circuit: everything up to (but excluding) the quote.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugAttestationResponse {
    pub attestation_data: String,
    pub response_body: String,
    pub response_status_code: u16,
    pub timestamp: u64,
    pub attestation_request: AttestationRequest,
    pub attestation_hash: String,
    pub user_data: String,
}

/// What `/notarize` returns, depending on the request shape.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum NotarizeResponse {
    Single(Box<AttestationResponse>),
    Multi(Box<AttestationResponseForMultipleTokens>),
    Debug(Box<DebugAttestationResponse>),
}

/// Reject requests the pipeline cannot process before any fetch happens.
pub fn validate_request(request: &AttestationRequest) -> Result<(), HostError> {
    let fail = |field: &str, reason: &str| {
        Err(HostError::ValidationFailed {
            field: field.to_string(),
            reason: reason.to_string(),
        })
    };

    if request.url.trim().is_empty() {
        return fail("url", "must not be empty");
    }
    if request.encoding_options.precision > extractor::MAX_PRECISION {
        return Err(HostError::InvalidEncodingOption(format!(
            "precision {} is over the maximum of {}",
            request.encoding_options.precision,
            extractor::MAX_PRECISION
        )));
    }

    match request.response_format {
        ResponseFormat::Html => {
            if request.html_result_type.is_none() {
                return fail("htmlResultType", "required for html responses");
            }
            if request.selector.trim().is_empty() {
                return fail("selector", "must not be empty");
            }
        }
        ResponseFormat::Json => {
            if request.html_result_type.is_some() {
                return fail("htmlResultType", "only valid for html responses");
            }
        }
    }

    if request.request_method == notary_lib::proof_data::HttpMethod::Get {
        if request.request_body.is_some() {
            return fail("requestBody", "only valid for POST requests");
        }
        if request.request_content_type.is_some() {
            return fail("requestContentType", "only valid for POST requests");
        }
    }

    if let TargetUrl::PriceFeed(_) = extractor::classify_url(&request.url)? {
        if request.encoding_options.value != EncodingValue::Float {
            return fail("encodingOptions.value", "price feeds require float encoding");
        }
    } else if request.selector.trim().is_empty() {
        return fail("selector", "must not be empty");
    }

    Ok(())
}

/// Run the full pipeline for one request.
pub async fn notarize_single(
    state: &AppState,
    request: &AttestationRequestWithDebug,
) -> Result<NotarizeResponse, HostError> {
    validate_request(&request.request)?;
    let timestamp = state.time.unix_now().await?;
    let extraction =
        extractor::extract_data_from_target_url(state, &request.request, timestamp).await?;
    build_attestation(state, &request.request, &extraction, timestamp, request.debug).await
}

/// Seal one extraction into a quote-backed response (or the debug
/// short-circuit).
pub async fn build_attestation(
    state: &AppState,
    request: &AttestationRequest,
    extraction: &ExtractDataResult,
    timestamp: u64,
    debug: bool,
) -> Result<NotarizeResponse, HostError> {
    let masked = request.masked(&state.config.accepted_headers);
    let prep = prepare_proof_data(
        &state.signer,
        extraction.status_code,
        &extraction.attestation_data,
        timestamp,
        &masked,
    )?;

    if debug {
        metrics::inc_notarization("debug");
        return Ok(NotarizeResponse::Debug(Box::new(DebugAttestationResponse {
            attestation_data: extraction.attestation_data.clone(),
            response_body: String::from_utf8_lossy(&extraction.response_body).into_owned(),
            response_status_code: extraction.status_code,
            timestamp,
            attestation_request: masked,
            attestation_hash: hex::encode(prep.attestation_hash),
            user_data: hex::encode(&prep.user_data),
        })));
    }

    let quote = generate_quote(state, prep.attestation_hash).await?;
    let report = OracleReport::new(&state.signer, &quote, &prep.user_data)?;
    let signature = report.sign(&state.signer)?;
    metrics::inc_notarization("success");

    Ok(NotarizeResponse::Single(Box::new(AttestationResponse {
        report_type: REPORT_TYPE.to_string(),
        attestation_report: quote,
        attestation_data: extraction.attestation_data.clone(),
        response_status_code: extraction.status_code,
        timestamp,
        attestation_request: masked,
        attestation_hash: hex::encode(prep.attestation_hash),
        request_hash: prep.request_hash,
        encoded_positions: prep.encoded_positions,
        oracle_report: report.data().to_string(),
        signature,
        address: state.signer.address().to_string(),
    })))
}

/// Run the pipeline for a batch: parallel extraction, chunks merged in
/// input order, one quote and one signature.
pub async fn notarize_many(
    state: &AppState,
    requests: &[AttestationRequestWithDebug],
) -> Result<NotarizeResponse, HostError> {
    if requests.is_empty() || requests.len() > MAX_ORACLE_CHUNKS {
        return Err(HostError::ValidationFailed {
            field: "requests".to_string(),
            reason: format!("batch size must be between 1 and {MAX_ORACLE_CHUNKS}"),
        });
    }
    if requests.iter().any(|r| r.debug) {
        return Err(HostError::ValidationFailed {
            field: "debug".to_string(),
            reason: "not supported for batched requests".to_string(),
        });
    }
    for request in requests {
        validate_request(&request.request)?;
    }

    let timestamp = state.time.unix_now().await?;

    let mut extractions = JoinSet::new();
    for (index, request) in requests.iter().enumerate() {
        let state = state.clone();
        let request = request.request.clone();
        extractions.spawn(async move {
            let result = extractor::extract_data_from_target_url(&state, &request, timestamp).await;
            (index, result)
        });
    }

    // Extraction is parallel but chunks are sealed in input-array order.
    let mut results: Vec<Option<ExtractDataResult>> = vec![None; requests.len()];
    while let Some(joined) = extractions.join_next().await {
        let (index, result) = joined?;
        results[index] = Some(result?);
    }
    let extractions: Vec<ExtractDataResult> =
        results.into_iter().map(|r| r.expect("every index was joined")).collect();

    let masked: Vec<AttestationRequest> = requests
        .iter()
        .map(|r| r.request.masked(&state.config.accepted_headers))
        .collect();
    let parts: Vec<ProofPart<'_>> = masked
        .iter()
        .zip(extractions.iter())
        .map(|(request, extraction)| ProofPart {
            status_code: extraction.status_code,
            attestation_data: &extraction.attestation_data,
            timestamp,
            request,
        })
        .collect();
    let prep = prepare_multi_proof_data(&state.signer, &parts)?;

    let quote = generate_quote(state, prep.attestation_hash).await?;
    let report = OracleReport::new(&state.signer, &quote, &prep.user_data)?;
    let signature = report.sign(&state.signer)?;
    metrics::inc_notarization("success");

    let attestations = masked
        .into_iter()
        .zip(extractions.iter())
        .enumerate()
        .map(|(chunk_index, (request, extraction))| TokenAttestation {
            chunk_index,
            attestation_request: request,
            attestation_data: extraction.attestation_data.clone(),
            response_status_code: extraction.status_code,
            request_hash: prep.request_hashes[chunk_index].clone(),
            encoded_positions: prep.encoded_positions[chunk_index],
        })
        .collect();

    Ok(NotarizeResponse::Multi(Box::new(AttestationResponseForMultipleTokens {
        report_type: REPORT_TYPE.to_string(),
        attestation_report: quote,
        timestamp,
        attestation_hash: hex::encode(prep.attestation_hash),
        oracle_report: report.data().to_string(),
        signature,
        address: state.signer.address().to_string(),
        attestations,
    })))
}

/// Mint a quote over `digest` off the async runtime, with timing.
async fn generate_quote(state: &AppState, digest: [u8; 16]) -> Result<Vec<u8>, HostError> {
    let enclave = state.enclave.clone();
    let started = Instant::now();
    let quote = tokio::task::spawn_blocking(move || enclave.generate_quote(&digest)).await??;
    metrics::observe_quote_generation(started.elapsed());
    Ok(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_lib::proof_data::{EncodingOptions, HtmlResultType, HttpMethod};
    use std::collections::HashMap;

    fn request(url: &str) -> AttestationRequest {
        AttestationRequest {
            url: url.to_string(),
            request_method: HttpMethod::Get,
            selector: "price".to_string(),
            response_format: ResponseFormat::Json,
            html_result_type: None,
            request_body: None,
            request_content_type: None,
            request_headers: HashMap::new(),
            encoding_options: EncodingOptions { value: EncodingValue::Float, precision: 6 },
        }
    }

    #[test]
    fn web_requests_validate() {
        validate_request(&request("https://example.com/api")).unwrap();
    }

    #[test]
    fn html_requests_need_a_result_type() {
        let mut req = request("https://example.com");
        req.response_format = ResponseFormat::Html;
        req.selector = "/html/head/title".to_string();
        assert!(matches!(
            validate_request(&req),
            Err(HostError::ValidationFailed { field, .. }) if field == "htmlResultType"
        ));
        req.html_result_type = Some(HtmlResultType::Value);
        validate_request(&req).unwrap();
    }

    #[test]
    fn json_requests_refuse_html_result_types() {
        let mut req = request("https://example.com");
        req.html_result_type = Some(HtmlResultType::Value);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn get_requests_refuse_bodies() {
        let mut req = request("https://example.com");
        req.request_body = Some("{}".to_string());
        assert!(validate_request(&req).is_err());

        req.request_body = None;
        req.request_method = HttpMethod::Post;
        req.request_body = Some("{}".to_string());
        req.request_content_type = Some("application/json".to_string());
        validate_request(&req).unwrap();
    }

    #[test]
    fn price_feeds_require_float_encoding() {
        let mut req = request("price_feed: btc");
        req.selector = String::new();
        validate_request(&req).unwrap();

        req.encoding_options.value = EncodingValue::String;
        assert!(matches!(
            validate_request(&req),
            Err(HostError::ValidationFailed { field, .. }) if field == "encodingOptions.value"
        ));
    }

    #[test]
    fn web_requests_need_a_selector() {
        let mut req = request("https://example.com");
        req.selector = String::new();
        assert!(matches!(
            validate_request(&req),
            Err(HostError::ValidationFailed { field, .. }) if field == "selector"
        ));
    }

    #[test]
    fn precision_ceiling_is_validated() {
        let mut req = request("https://example.com");
        req.encoding_options.precision = 13;
        assert!(matches!(
            validate_request(&req),
            Err(HostError::InvalidEncodingOption(_))
        ));
    }

    fn extraction(data: &str) -> ExtractDataResult {
        ExtractDataResult {
            response_body: format!("{{\"price\":\"{data}\"}}").into_bytes(),
            attestation_data: data.to_string(),
            status_code: 200,
        }
    }

    #[tokio::test]
    async fn debug_short_circuits_before_the_quote() {
        let (dir, state) = crate::test_util::test_state();
        let response =
            build_attestation(&state, &request("https://example.com"), &extraction("50000.000000"), 1_700_000_000, true)
                .await
                .unwrap();

        let NotarizeResponse::Debug(debug) = response else {
            panic!("expected the debug short-circuit");
        };
        assert_eq!(debug.attestation_data, "50000.000000");
        assert_eq!(debug.response_status_code, 200);

        // Hash recomputes from the sealed user data.
        let user_data = hex::decode(&debug.user_data).unwrap();
        let formatted = state.signer.format_message(&user_data, 1).unwrap();
        let recomputed = state.signer.hash_message(formatted.as_bytes()).unwrap();
        assert_eq!(debug.attestation_hash, hex::encode(recomputed));

        // No quote was minted: the report-data file is untouched.
        let sealed = std::fs::read(dir.path().join("user_report_data")).unwrap();
        assert!(sealed.is_empty());
    }

    #[tokio::test]
    async fn identical_inputs_seal_identical_user_data() {
        let (_dir, state) = crate::test_util::test_state();
        let run = || async {
            let response = build_attestation(
                &state,
                &request("https://example.com"),
                &extraction("50000.000000"),
                1_700_000_000,
                true,
            )
            .await
            .unwrap();
            match response {
                NotarizeResponse::Debug(debug) => (debug.user_data.clone(), debug.attestation_hash.clone()),
                _ => panic!("expected the debug short-circuit"),
            }
        };
        assert_eq!(run().await, run().await);
    }

    #[tokio::test]
    async fn the_quote_is_bound_to_the_attestation_hash() {
        let (dir, state) = crate::test_util::test_state();
        let response = build_attestation(
            &state,
            &request("https://example.com"),
            &extraction("50000.000000"),
            1_700_000_000,
            false,
        )
        .await
        .unwrap();

        let NotarizeResponse::Single(attestation) = response else {
            panic!("expected a sealed attestation");
        };
        assert_eq!(attestation.report_type, "sgx");
        assert!(attestation.signature.starts_with("sign1"));
        assert_eq!(attestation.address, state.signer.address());

        // The handshake wrote the digest, zero-extended to 64 bytes, as the
        // quote's report data.
        let sealed = std::fs::read(dir.path().join("user_report_data")).unwrap();
        let digest = hex::decode(&attestation.attestation_hash).unwrap();
        assert_eq!(&sealed[..16], digest.as_slice());
        assert_eq!(&sealed[16..], [0u8; 48]);

        // The signed report text recomputes from the masked request, the
        // extraction and the quote alone, so the signature covers the
        // request metadata, not just the quote bytes.
        let masked = request("https://example.com").masked(&state.config.accepted_headers);
        let prep = prepare_proof_data(&state.signer, 200, "50000.000000", 1_700_000_000, &masked)
            .unwrap();
        let recomputed =
            OracleReport::new(&state.signer, &attestation.attestation_report, &prep.user_data)
                .unwrap();
        assert_eq!(recomputed.data(), attestation.oracle_report);
    }
}
