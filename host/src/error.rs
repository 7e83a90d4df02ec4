//! The standardized error returned by the notarization host.
//!
//! Every failure the pipeline can surface maps to a stable `errorCode`
//! string; on-chain tooling and dashboards key on these, so renaming one is
//! a breaking change.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use notary_lib::{EncodingError, SigningError};
use notary_sgx::EnclaveError;
use serde_json::{json, Value};
use utoipa::ToSchema;

#[derive(thiserror::Error, Debug, ToSchema)]
pub enum HostError {
    /// For an unusable server bind address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// For a request body that is not `application/json`.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// For a request body that does not decode.
    #[error("There was a deserialization error: {0}")]
    DecodingRequestBody(String),

    /// For a request body over the configured ceiling.
    #[error("Request body too large")]
    RequestBodyTooLarge,

    /// For semantically invalid request fields.
    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    /// For a target URL that does not normalize to an acceptable HTTPS URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// For transport-level failures talking to the target.
    #[error("There was an error fetching data: {0}")]
    FetchingData(String),

    /// For a non-2xx response from the target.
    #[error("Target returned status code {0}")]
    InvalidStatusCode(u16),

    /// For failures reading the target response body.
    #[error("There was an error reading the response: {0}")]
    ReadingJsonResponse(String),

    /// For a target response that is not valid JSON.
    #[error("There was an error decoding the JSON response: {0}")]
    DecodingJsonResponse(String),

    /// For a target response that is not parseable HTML.
    #[error("There was an error decoding the HTML response: {0}")]
    DecodingHtmlResponse(String),

    /// For a selector that matches nothing in the response.
    #[error("Selector {0:?} not found in the response")]
    SelectorNotFound(String),

    /// For a selector match that yields an empty value.
    #[error("Extracted attestation data is empty")]
    EmptyAttestationData,

    /// For unusable encoding options.
    #[error("Invalid encoding option: {0}")]
    InvalidEncodingOption(String),

    /// For extracted values that do not parse under the requested encoding.
    #[error("Value {0:?} is not a valid number")]
    InvalidRationalNumber(String),

    /// For an aggregation round where no exchange returned a sample.
    #[error("No prices found")]
    NoPricesFound,

    /// For an aggregation round where every sample failed the volume gate.
    #[error("All prices are below the minimum exchange volume")]
    AllPricesBelowMinVolume,

    /// For an aggregation round where every sample was filtered as an
    /// outlier.
    #[error("All prices were filtered out as outliers")]
    AllPricesOutlierFiltered,

    /// For an aggregation round with zero total volume.
    #[error("Total volume is zero")]
    ZeroVolume,

    /// For an aggregation round with zero volume after weight capping.
    #[error("Total capped volume is zero")]
    ZeroCappedVolume,

    /// For an aggregation round with too wide a cross-venue spread.
    #[error("Cross-venue price dispersion is too high")]
    CrossVenueDispersionTooHigh,

    /// For an aggregation round where too few exchanges survived.
    #[error("Only {got} exchanges returned usable data, {required} required")]
    InsufficientExchangeData { got: usize, required: usize },

    /// For a price-feed token outside the supported set.
    #[error("Token not supported: {0}")]
    TokenNotSupported(String),

    /// For a token referencing an exchange missing from the configuration.
    #[error("Exchange not configured: {0}")]
    ExchangeNotConfigured(String),

    /// For an exchange without a symbol mapping for the requested token.
    #[error("Exchange {exchange} has no symbol configured for {token}")]
    SymbolNotConfigured { exchange: String, token: String },

    /// For a token with an empty exchange list.
    #[error("No trading pairs configured for {0}")]
    NoTradingPairsConfigured(String),

    /// For trusted-time acquisition failures.
    #[error("There was an error fetching trusted time: {0}")]
    TrustedTime(String),

    /// For byte-encoding failures in the attestation pipeline.
    #[error(transparent)]
    #[schema(value_type = Value)]
    Encoding(#[from] EncodingError),

    /// For signing-context failures.
    #[error(transparent)]
    #[schema(value_type = Value)]
    Signing(#[from] SigningError),

    /// For enclave adapter failures.
    #[error(transparent)]
    #[schema(value_type = Value)]
    Enclave(#[from] EnclaveError),

    /// For errors related to the tokio runtime.
    #[error("There was a tokio task error: {0}")]
    #[schema(value_type = Value)]
    JoinHandle(#[from] tokio::task::JoinError),

    /// A catch-all error for any other error type.
    #[error("There was an unexpected error: {0}")]
    #[schema(value_type = Value)]
    Anyhow(#[from] anyhow::Error),
}

impl HostError {
    /// Stable code surfaced as the `errorCode` field.
    pub fn error_code(&self) -> &'static str {
        match self {
            HostError::InvalidAddress(_) => "InvalidAddress",
            HostError::InvalidContentType(_) => "InvalidContentType",
            HostError::DecodingRequestBody(_) => "DecodingRequestBody",
            HostError::RequestBodyTooLarge => "RequestBodyTooLarge",
            HostError::ValidationFailed { .. } => "ValidationFailed",
            HostError::InvalidUrl(_) => "InvalidURL",
            HostError::FetchingData(_) => "FetchingData",
            HostError::InvalidStatusCode(_) => "InvalidStatusCode",
            HostError::ReadingJsonResponse(_) => "ReadingJSONResponse",
            HostError::DecodingJsonResponse(_) => "DecodingJSONResponse",
            HostError::DecodingHtmlResponse(_) => "DecodingHTMLResponse",
            HostError::SelectorNotFound(_) => "SelectorNotFound",
            HostError::EmptyAttestationData => "EmptyAttestationData",
            HostError::InvalidEncodingOption(_) => "InvalidEncodingOption",
            HostError::InvalidRationalNumber(_) => "InvalidRationalNumber",
            HostError::NoPricesFound => "NoPricesFound",
            HostError::AllPricesBelowMinVolume => "AllPricesBelowMinVolume",
            HostError::AllPricesOutlierFiltered => "AllPricesOutlierFiltered",
            HostError::ZeroVolume => "ZeroVolume",
            HostError::ZeroCappedVolume => "ZeroCappedVolume",
            HostError::CrossVenueDispersionTooHigh => "CrossVenueDispersionTooHigh",
            HostError::InsufficientExchangeData { .. } => "InsufficientExchangeData",
            HostError::TokenNotSupported(_) => "TokenNotSupported",
            HostError::ExchangeNotConfigured(_) => "ExchangeNotConfigured",
            HostError::SymbolNotConfigured { .. } => "SymbolNotConfigured",
            HostError::NoTradingPairsConfigured(_) => "NoTradingPairsConfigured",
            HostError::TrustedTime(_) => "TrustedTime",
            HostError::Encoding(e) => e.code(),
            HostError::Signing(e) => e.code(),
            HostError::Enclave(e) => e.code(),
            HostError::JoinHandle(_) => "InternalError",
            HostError::Anyhow(_) => "InternalError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HostError::InvalidContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HostError::RequestBodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            HostError::DecodingRequestBody(_)
            | HostError::ValidationFailed { .. }
            | HostError::InvalidUrl(_)
            | HostError::SelectorNotFound(_)
            | HostError::EmptyAttestationData
            | HostError::InvalidEncodingOption(_)
            | HostError::InvalidRationalNumber(_)
            | HostError::TokenNotSupported(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            HostError::InvalidStatusCode(code) => Some(json!({ "statusCode": code })),
            HostError::ValidationFailed { field, .. } => Some(json!({ "field": field })),
            HostError::InsufficientExchangeData { got, required } => {
                Some(json!({ "got": got, "required": required }))
            }
            HostError::SymbolNotConfigured { exchange, token } => {
                Some(json!({ "exchange": exchange, "token": token }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> axum::response::Response {
        let mut body = json!({
            "errorCode": self.error_code(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        (self.status(), axum::Json(body)).into_response()
    }
}

/// A type alias for the standardized result type returned by the host.
pub type HostResult<T> = axum::response::Result<T, HostError>;
