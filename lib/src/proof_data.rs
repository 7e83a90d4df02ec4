//! Positional encoding of a request/response tuple into the fixed-size
//! user-data region sealed under the TEE quote.
//!
//! The byte at a given offset carries the meaning defined here and nowhere
//! else; verifiers read the region by offset, never by field name. Changing
//! any offset is a consensus break with deployed verification programs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::encoding::pad_right;
use crate::error::{EncodingError, SigningError};
use crate::signer::SigningContext;

/// Size of one oracle user-data chunk.
pub const ORACLE_CHUNK_SIZE: usize = 256;
/// Value substituted for headers outside the allow-list before sealing.
pub const MASKED_HEADER_VALUE: &str = "*****";
/// Most chunks a multi-token payload may carry; bounded by the chunk count
/// the formatter accepts.
pub const MAX_ORACLE_CHUNKS: usize = 32;

pub const MAX_ATTESTATION_DATA_SIZE: usize = 64;
pub const MAX_URL_SIZE: usize = 96;
pub const MAX_SELECTOR_SIZE: usize = 48;

// Fixed offsets inside one oracle chunk.
const TIMESTAMP_POS: usize = 0;
const STATUS_CODE_POS: usize = 8;
const METHOD_POS: usize = 10;
const RESPONSE_FORMAT_POS: usize = 11;
const HTML_RESULT_TYPE_POS: usize = 12;
const ENCODING_VALUE_POS: usize = 13;
const ENCODING_PRECISION_POS: usize = 14;
const ATTESTATION_DATA_POS: usize = 16;
const URL_POS: usize = 80;
const SELECTOR_POS: usize = 176;
const REQUEST_EXTRAS_DIGEST_POS: usize = 224;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

impl HttpMethod {
    fn encode(self) -> u8 {
        match self {
            HttpMethod::Get => 0,
            HttpMethod::Post => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Html,
}

impl ResponseFormat {
    fn encode(self) -> u8 {
        match self {
            ResponseFormat::Json => 0,
            ResponseFormat::Html => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HtmlResultType {
    Element,
    Value,
}

impl HtmlResultType {
    fn encode(opt: Option<Self>) -> u8 {
        match opt {
            None => 0,
            Some(HtmlResultType::Element) => 1,
            Some(HtmlResultType::Value) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EncodingValue {
    String,
    Int,
    Float,
}

impl EncodingValue {
    fn encode(self) -> u8 {
        match self {
            EncodingValue::String => 0,
            EncodingValue::Int => 1,
            EncodingValue::Float => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EncodingOptions {
    pub value: EncodingValue,
    #[serde(default)]
    pub precision: u8,
}

/// A caller-supplied notarization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequest {
    /// HTTPS target, or one of the reserved `price_feed:`/`crypto/rand:`
    /// URLs.
    pub url: String,
    pub request_method: HttpMethod,
    #[serde(default)]
    pub selector: String,
    pub response_format: ResponseFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_result_type: Option<HtmlResultType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    pub encoding_options: EncodingOptions,
}

impl AttestationRequest {
    /// Copy of the request with every header outside `accepted` masked.
    /// This is what gets sealed and echoed; the wire request keeps the
    /// original values.
    pub fn masked(&self, accepted: &[String]) -> Self {
        let mut masked = self.clone();
        masked.request_headers = mask_unaccepted_headers(&self.request_headers, accepted);
        masked
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttestationRequestWithDebug {
    #[serde(flatten)]
    pub request: AttestationRequest,
    /// Skip quote generation and return the extracted value for inspection.
    #[serde(default)]
    pub debug: bool,
}

/// Replace the value of every header not named in `accepted` with
/// [`MASKED_HEADER_VALUE`]. Matching is exact-case. Idempotent.
pub fn mask_unaccepted_headers(
    headers: &HashMap<String, String>,
    accepted: &[String],
) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if accepted.iter().any(|a| a == name) {
                value.clone()
            } else {
                MASKED_HEADER_VALUE.to_string()
            };
            (name.clone(), value)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PositionInfo {
    pub pos: usize,
    pub len: usize,
}

/// Where each field lives inside one oracle chunk.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPositions {
    pub timestamp: PositionInfo,
    pub status_code: PositionInfo,
    pub method: PositionInfo,
    pub response_format: PositionInfo,
    pub html_result_type: PositionInfo,
    pub encoding_options: PositionInfo,
    pub attestation_data: PositionInfo,
    pub url: PositionInfo,
    pub selector: PositionInfo,
    pub request_extras_digest: PositionInfo,
}

impl EncodedPositions {
    fn new() -> Self {
        Self {
            timestamp: PositionInfo { pos: TIMESTAMP_POS, len: 8 },
            status_code: PositionInfo { pos: STATUS_CODE_POS, len: 2 },
            method: PositionInfo { pos: METHOD_POS, len: 1 },
            response_format: PositionInfo { pos: RESPONSE_FORMAT_POS, len: 1 },
            html_result_type: PositionInfo { pos: HTML_RESULT_TYPE_POS, len: 1 },
            encoding_options: PositionInfo { pos: ENCODING_VALUE_POS, len: 2 },
            attestation_data: PositionInfo {
                pos: ATTESTATION_DATA_POS,
                len: MAX_ATTESTATION_DATA_SIZE,
            },
            url: PositionInfo { pos: URL_POS, len: MAX_URL_SIZE },
            selector: PositionInfo { pos: SELECTOR_POS, len: MAX_SELECTOR_SIZE },
            request_extras_digest: PositionInfo {
                pos: REQUEST_EXTRAS_DIGEST_POS,
                len: 32,
            },
        }
    }
}

/// Everything needed to mint and later verify a quote for one request.
#[derive(Debug, Clone)]
pub struct QuotePreparationData {
    pub user_data: Vec<u8>,
    pub formatted_user_data: String,
    pub request_hash: String,
    pub attestation_hash: [u8; 16],
    pub encoded_positions: EncodedPositions,
}

/// One request/response tuple of a multi-token batch.
#[derive(Debug, Clone, Copy)]
pub struct ProofPart<'a> {
    pub status_code: u16,
    pub attestation_data: &'a str,
    pub timestamp: u64,
    pub request: &'a AttestationRequest,
}

/// Prepared payload for a multi-token batch: all chunks concatenated in
/// request order and hashed once.
#[derive(Debug, Clone)]
pub struct MultiQuotePreparationData {
    pub user_data: Vec<u8>,
    pub formatted_user_data: String,
    pub attestation_hash: [u8; 16],
    pub request_hashes: Vec<String>,
    pub encoded_positions: Vec<EncodedPositions>,
}

/// Serialize one request/response tuple into a 256-byte oracle chunk.
///
/// The request must already be masked; this function seals whatever header
/// values it is given.
pub fn encode_user_data(
    status_code: u16,
    attestation_data: &str,
    timestamp: u64,
    request: &AttestationRequest,
) -> Result<(Vec<u8>, EncodedPositions), EncodingError> {
    let data = attestation_data.as_bytes();
    if data.len() > MAX_ATTESTATION_DATA_SIZE {
        return Err(EncodingError::AttestationDataTooLarge {
            len: data.len(),
            max: MAX_ATTESTATION_DATA_SIZE,
        });
    }
    let url = request.url.as_bytes();
    if url.len() > MAX_URL_SIZE {
        return Err(EncodingError::UrlTooLarge { len: url.len(), max: MAX_URL_SIZE });
    }
    let selector = request.selector.as_bytes();
    if selector.len() > MAX_SELECTOR_SIZE {
        return Err(EncodingError::SelectorTooLarge {
            len: selector.len(),
            max: MAX_SELECTOR_SIZE,
        });
    }

    let mut chunk = vec![0u8; ORACLE_CHUNK_SIZE];
    chunk[TIMESTAMP_POS..TIMESTAMP_POS + 8].copy_from_slice(&timestamp.to_le_bytes());
    chunk[STATUS_CODE_POS..STATUS_CODE_POS + 2].copy_from_slice(&status_code.to_le_bytes());
    chunk[METHOD_POS] = request.request_method.encode();
    chunk[RESPONSE_FORMAT_POS] = request.response_format.encode();
    chunk[HTML_RESULT_TYPE_POS] = HtmlResultType::encode(request.html_result_type);
    chunk[ENCODING_VALUE_POS] = request.encoding_options.value.encode();
    chunk[ENCODING_PRECISION_POS] = request.encoding_options.precision;
    chunk[ATTESTATION_DATA_POS..ATTESTATION_DATA_POS + MAX_ATTESTATION_DATA_SIZE]
        .copy_from_slice(&pad_right(data, MAX_ATTESTATION_DATA_SIZE));
    chunk[URL_POS..URL_POS + MAX_URL_SIZE].copy_from_slice(&pad_right(url, MAX_URL_SIZE));
    chunk[SELECTOR_POS..SELECTOR_POS + MAX_SELECTOR_SIZE]
        .copy_from_slice(&pad_right(selector, MAX_SELECTOR_SIZE));
    chunk[REQUEST_EXTRAS_DIGEST_POS..REQUEST_EXTRAS_DIGEST_POS + 32]
        .copy_from_slice(&request_extras_digest(request));

    Ok((chunk, EncodedPositions::new()))
}

/// Digest over the parts of the request that have no dedicated slot:
/// headers, body and content type. Headers are sorted bytewise by name so
/// the digest does not depend on map iteration order.
fn request_extras_digest(request: &AttestationRequest) -> [u8; 32] {
    let mut headers: Vec<(&String, &String)> = request.request_headers.iter().collect();
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, value) in headers {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update([0u8]);
    if let Some(body) = &request.request_body {
        hasher.update(body.as_bytes());
    }
    hasher.update([0u8]);
    if let Some(content_type) = &request.request_content_type {
        hasher.update(content_type.as_bytes());
    }
    hasher.finalize().into()
}

/// Digest of the request portion of a chunk: the response-dependent ranges
/// (timestamp, status code, attestation data) are zeroed first so the hash
/// identifies the request alone.
pub fn request_hash_hex(chunk: &[u8]) -> String {
    let mut scrubbed = chunk.to_vec();
    scrubbed[TIMESTAMP_POS..TIMESTAMP_POS + 8].fill(0);
    scrubbed[STATUS_CODE_POS..STATUS_CODE_POS + 2].fill(0);
    scrubbed[ATTESTATION_DATA_POS..ATTESTATION_DATA_POS + MAX_ATTESTATION_DATA_SIZE].fill(0);
    hex::encode(Sha256::digest(&scrubbed))
}

/// Encode, format and hash a single request/response tuple.
pub fn prepare_proof_data(
    ctx: &SigningContext,
    status_code: u16,
    attestation_data: &str,
    timestamp: u64,
    request: &AttestationRequest,
) -> Result<QuotePreparationData, SigningError> {
    let (user_data, encoded_positions) =
        encode_user_data(status_code, attestation_data, timestamp, request)?;
    let formatted_user_data = ctx.format_message(&user_data, 1)?;
    let attestation_hash = ctx.hash_message(formatted_user_data.as_bytes())?;
    let request_hash = request_hash_hex(&user_data);
    Ok(QuotePreparationData {
        user_data,
        formatted_user_data,
        request_hash,
        attestation_hash,
        encoded_positions,
    })
}

/// Encode a batch: one chunk per part, concatenated in input order,
/// zero-padded to `parts.len() * 256` bytes and hashed as `parts.len()`
/// chunks.
pub fn prepare_multi_proof_data(
    ctx: &SigningContext,
    parts: &[ProofPart<'_>],
) -> Result<MultiQuotePreparationData, SigningError> {
    if parts.is_empty() || parts.len() > MAX_ORACLE_CHUNKS {
        return Err(EncodingError::InvalidChunkCount(parts.len()).into());
    }

    let mut user_data = Vec::with_capacity(parts.len() * ORACLE_CHUNK_SIZE);
    let mut request_hashes = Vec::with_capacity(parts.len());
    let mut encoded_positions = Vec::with_capacity(parts.len());
    for part in parts {
        let (chunk, positions) = encode_user_data(
            part.status_code,
            part.attestation_data,
            part.timestamp,
            part.request,
        )?;
        request_hashes.push(request_hash_hex(&chunk));
        encoded_positions.push(positions);
        user_data.extend_from_slice(&chunk);
    }

    let formatted_user_data = ctx.format_message(&user_data, parts.len())?;
    let attestation_hash = ctx.hash_message(formatted_user_data.as_bytes())?;
    Ok(MultiQuotePreparationData {
        user_data,
        formatted_user_data,
        attestation_hash,
        request_hashes,
        encoded_positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> Vec<String> {
        vec![
            "Accept".to_string(),
            "Content-Type".to_string(),
            "User-Agent".to_string(),
        ]
    }

    fn request() -> AttestationRequest {
        AttestationRequest {
            url: "https://example.com/api/price".to_string(),
            request_method: HttpMethod::Get,
            selector: "price".to_string(),
            response_format: ResponseFormat::Json,
            html_result_type: None,
            request_body: None,
            request_content_type: None,
            request_headers: HashMap::from([
                ("Accept".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "Bearer sekrit".to_string()),
            ]),
            encoding_options: EncodingOptions { value: EncodingValue::Float, precision: 6 },
        }
    }

    #[test]
    fn masking_replaces_only_unaccepted_headers() {
        let masked = request().masked(&accepted());
        assert_eq!(masked.request_headers["Accept"], "application/json");
        assert_eq!(masked.request_headers["Authorization"], MASKED_HEADER_VALUE);
    }

    #[test]
    fn masking_is_idempotent() {
        let once = request().masked(&accepted());
        let twice = once.masked(&accepted());
        assert_eq!(once, twice);

        let (chunk_once, _) = encode_user_data(200, "1.0", 1_700_000_000, &once).unwrap();
        let (chunk_twice, _) = encode_user_data(200, "1.0", 1_700_000_000, &twice).unwrap();
        assert_eq!(chunk_once, chunk_twice);
    }

    #[test]
    fn masking_matches_exact_case() {
        let mut req = request();
        req.request_headers.insert("accept".to_string(), "text/html".to_string());
        let masked = req.masked(&accepted());
        assert_eq!(masked.request_headers["accept"], MASKED_HEADER_VALUE);
        assert_eq!(masked.request_headers["Accept"], "application/json");
    }

    #[test]
    fn chunk_layout_is_positional() {
        let (chunk, positions) = encode_user_data(404, "BTC", 1_700_000_123, &request()).unwrap();
        assert_eq!(chunk.len(), ORACLE_CHUNK_SIZE);
        assert_eq!(&chunk[0..8], &1_700_000_123u64.to_le_bytes());
        assert_eq!(&chunk[8..10], &404u16.to_le_bytes());
        assert_eq!(chunk[10], 0); // GET
        assert_eq!(chunk[11], 0); // json
        assert_eq!(chunk[12], 0); // no html result type
        assert_eq!(chunk[13], 2); // float
        assert_eq!(chunk[14], 6); // precision
        assert_eq!(&chunk[16..19], b"BTC");
        assert!(chunk[19..80].iter().all(|b| *b == 0));
        assert_eq!(&chunk[80..109], request().url.as_bytes());
        assert_eq!(&chunk[176..181], b"price");
        assert_eq!(positions.timestamp.pos, 0);
        assert_eq!(positions.request_extras_digest.pos, 224);
    }

    #[test]
    fn header_order_does_not_change_the_chunk() {
        let mut a = request();
        a.request_headers = HashMap::from([
            ("X-One".to_string(), "1".to_string()),
            ("X-Two".to_string(), "2".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ]);
        let mut b = request();
        b.request_headers = HashMap::from([
            ("Accept".to_string(), "*/*".to_string()),
            ("X-Two".to_string(), "2".to_string()),
            ("X-One".to_string(), "1".to_string()),
        ]);
        let (chunk_a, _) = encode_user_data(200, "x", 1, &a).unwrap();
        let (chunk_b, _) = encode_user_data(200, "x", 1, &b).unwrap();
        assert_eq!(chunk_a, chunk_b);
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let long = "x".repeat(MAX_ATTESTATION_DATA_SIZE + 1);
        assert!(matches!(
            encode_user_data(200, &long, 1, &request()),
            Err(EncodingError::AttestationDataTooLarge { .. })
        ));

        let mut req = request();
        req.url = format!("https://example.com/{}", "a".repeat(MAX_URL_SIZE));
        assert!(matches!(
            encode_user_data(200, "x", 1, &req),
            Err(EncodingError::UrlTooLarge { .. })
        ));

        let mut req = request();
        req.selector = "p".repeat(MAX_SELECTOR_SIZE + 1);
        assert!(matches!(
            encode_user_data(200, "x", 1, &req),
            Err(EncodingError::SelectorTooLarge { .. })
        ));
    }

    #[test]
    fn request_hash_ignores_the_response() {
        let req = request();
        let (chunk_a, _) = encode_user_data(200, "50000.00", 1_700_000_000, &req).unwrap();
        let (chunk_b, _) = encode_user_data(500, "49000.00", 1_800_000_000, &req).unwrap();
        assert_eq!(request_hash_hex(&chunk_a), request_hash_hex(&chunk_b));

        let mut other = req.clone();
        other.selector = "volume".to_string();
        let (chunk_c, _) = encode_user_data(200, "50000.00", 1_700_000_000, &other).unwrap();
        assert_ne!(request_hash_hex(&chunk_a), request_hash_hex(&chunk_c));
    }

    #[test]
    fn prepared_hash_matches_recomputation() {
        let ctx = SigningContext::generate().unwrap();
        let masked = request().masked(&accepted());
        let prep = prepare_proof_data(&ctx, 200, "50000.000000", 1_700_000_000, &masked).unwrap();
        assert_eq!(prep.user_data.len(), ORACLE_CHUNK_SIZE);
        let recomputed = ctx
            .hash_message(ctx.format_message(&prep.user_data, 1).unwrap().as_bytes())
            .unwrap();
        assert_eq!(prep.attestation_hash, recomputed);
    }

    #[test]
    fn multi_chunks_keep_input_order() {
        let ctx = SigningContext::generate().unwrap();
        let first = request();
        let mut second = request();
        second.url = "https://example.org/other".to_string();
        let parts = [
            ProofPart { status_code: 200, attestation_data: "1", timestamp: 10, request: &first },
            ProofPart { status_code: 200, attestation_data: "2", timestamp: 10, request: &second },
        ];
        let prep = prepare_multi_proof_data(&ctx, &parts).unwrap();
        assert_eq!(prep.user_data.len(), 2 * ORACLE_CHUNK_SIZE);
        assert_eq!(&prep.user_data[16..17], b"1");
        assert_eq!(&prep.user_data[ORACLE_CHUNK_SIZE + 16..ORACLE_CHUNK_SIZE + 17], b"2");
        assert_eq!(prep.request_hashes.len(), 2);
        assert_eq!(prep.encoded_positions.len(), 2);

        let recomputed = ctx
            .hash_message(ctx.format_message(&prep.user_data, 2).unwrap().as_bytes())
            .unwrap();
        assert_eq!(prep.attestation_hash, recomputed);
    }

    #[test]
    fn empty_and_oversized_batches_are_rejected() {
        let ctx = SigningContext::generate().unwrap();
        assert!(prepare_multi_proof_data(&ctx, &[]).is_err());

        let req = request();
        let part = ProofPart { status_code: 200, attestation_data: "1", timestamp: 1, request: &req };
        let parts = vec![part; MAX_ORACLE_CHUNKS + 1];
        assert!(prepare_multi_proof_data(&ctx, &parts).is_err());
    }
}
