//! Data extraction: fetch a caller-specified HTTPS target (or route to the
//! price-feed aggregator) and select one value from the response.

mod encode;
mod html;
mod json;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use notary_lib::proof_data::{AttestationRequest, HttpMethod, ResponseFormat};
use reqwest::Url;
use tracing::warn;

use crate::error::HostError;
use crate::price_feed::{self, PriceToken};
use crate::AppState;

pub use encode::{apply_encoding, MAX_PRECISION};

/// Reserved URL prefix routed to the price-feed aggregator.
pub const PRICE_FEED_URL_PREFIX: &str = "price_feed:";
/// Reserved URL prefix of the random endpoint; never reaches the extractor.
pub const RANDOM_URL_PREFIX: &str = "crypto/rand:";

/// Ceiling on target response bodies.
pub const MAX_RESPONSE_BODY_SIZE: usize = 4 << 20;
/// Attempts per target, retries included.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(3);

/// Outcome of one extraction.
#[derive(Debug, Clone)]
pub struct ExtractDataResult {
    pub response_body: Vec<u8>,
    pub attestation_data: String,
    pub status_code: u16,
}

/// Where a request URL routes to.
#[derive(Debug, Clone)]
pub enum TargetUrl {
    PriceFeed(PriceToken),
    Web(Url),
}

/// Route a caller URL: reserved price-feed prefix or a normalized HTTPS
/// target.
pub fn classify_url(raw: &str) -> Result<TargetUrl, HostError> {
    let trimmed = raw.trim();
    if let Some(token) = trimmed.strip_prefix(PRICE_FEED_URL_PREFIX) {
        let token = token
            .trim()
            .parse::<PriceToken>()
            .map_err(|_| HostError::TokenNotSupported(token.trim().to_string()))?;
        return Ok(TargetUrl::PriceFeed(token));
    }
    Ok(TargetUrl::Web(normalize_url(trimmed)?))
}

/// Normalize a caller URL: default the scheme to `https`, refuse fragments,
/// refuse hostnames without a dot, refuse anything that is not HTTPS.
pub fn normalize_url(raw: &str) -> Result<Url, HostError> {
    let invalid = || HostError::InvalidUrl(raw.to_string());
    if raw.is_empty() {
        return Err(invalid());
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
    if url.scheme() != "https" {
        return Err(invalid());
    }
    if url.fragment().is_some() {
        return Err(invalid());
    }
    match url.host_str() {
        Some(host) if host.contains('.') => Ok(url),
        _ => Err(invalid()),
    }
}

/// Extract the attestation value for `request` at `timestamp`.
pub async fn extract_data_from_target_url(
    state: &AppState,
    request: &AttestationRequest,
    timestamp: u64,
) -> Result<ExtractDataResult, HostError> {
    match classify_url(&request.url)? {
        TargetUrl::PriceFeed(token) => {
            let result = price_feed::aggregate_price(
                &state.config,
                &state.http,
                token,
                timestamp,
                request.encoding_options.precision,
            )
            .await?;
            let attestation_data = result.vwap.clone();
            let response_body =
                serde_json::to_vec(&result).map_err(|e| HostError::Anyhow(e.into()))?;
            Ok(ExtractDataResult { response_body, attestation_data, status_code: 200 })
        }
        TargetUrl::Web(url) => extract_from_web(state, url, request).await,
    }
}

async fn extract_from_web(
    state: &AppState,
    url: Url,
    request: &AttestationRequest,
) -> Result<ExtractDataResult, HostError> {
    let host = url.host_str().ok_or_else(|| HostError::InvalidUrl(request.url.clone()))?;
    if !state.config.is_whitelisted(host) {
        return Err(HostError::ValidationFailed {
            field: "url".to_string(),
            reason: format!("hostname {host} is not whitelisted"),
        });
    }

    let response = fetch_with_retry(&state.http, request, &url).await?;
    let status_code = response.status().as_u16();
    if !response.status().is_success() {
        return Err(HostError::InvalidStatusCode(status_code));
    }

    let body = read_body_capped(response).await?;
    let selected = match request.response_format {
        ResponseFormat::Json => json::select_json(&body, &request.selector)?,
        ResponseFormat::Html => {
            html::select_html(&body, &request.selector, request.html_result_type)?
        }
    };
    let attestation_data = apply_encoding(&selected, &request.encoding_options)?;

    Ok(ExtractDataResult { response_body: body, attestation_data, status_code })
}

/// Send the request, retrying transport failures with 2–3 s exponential
/// backoff, at most [`MAX_FETCH_ATTEMPTS`] attempts. The wire request
/// carries the caller's original (unmasked) headers.
pub(crate) async fn fetch_with_retry(
    client: &reqwest::Client,
    request: &AttestationRequest,
    url: &Url,
) -> Result<reqwest::Response, HostError> {
    let backoff = ExponentialBackoff {
        initial_interval: INITIAL_BACKOFF,
        max_interval: MAX_BACKOFF,
        multiplier: 1.5,
        randomization_factor: 0.3,
        max_elapsed_time: Some(Duration::from_secs(20)),
        ..Default::default()
    };
    let attempts = AtomicU32::new(0);

    backoff::future::retry(backoff, || async {
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let method = match request.request_method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = client.request(method, url.clone());
        for (name, value) in &request.request_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = &request.request_content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.request_body {
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(url = %url, attempt, error = %e, "target fetch failed");
                if attempt >= MAX_FETCH_ATTEMPTS {
                    Err(backoff::Error::permanent(e))
                } else {
                    Err(backoff::Error::transient(e))
                }
            }
        }
    })
    .await
    .map_err(|e| HostError::FetchingData(e.to_string()))
}

async fn read_body_capped(response: reqwest::Response) -> Result<Vec<u8>, HostError> {
    if let Some(length) = response.content_length() {
        if length > MAX_RESPONSE_BODY_SIZE as u64 {
            return Err(HostError::ReadingJsonResponse(format!(
                "response of {length} bytes exceeds the {MAX_RESPONSE_BODY_SIZE} byte limit"
            )));
        }
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| HostError::ReadingJsonResponse(e.to_string()))?;
    if bytes.len() > MAX_RESPONSE_BODY_SIZE {
        return Err(HostError::ReadingJsonResponse(format!(
            "response of {} bytes exceeds the {MAX_RESPONSE_BODY_SIZE} byte limit",
            bytes.len()
        )));
    }
    Ok(bytes.to_vec())
}
